pub const USAGE_MSG: &str = "\
usage: jobsh [-i] [-o name=value]... [-c command]
       jobsh -h | -V";

const DESCRIPTOR: &str = "jobsh - a small job-control shell";

const HELP_MSG: &str = "Options:
  -c, --command=command    run the command line and exit with its status
  -h, --help               display help message and exit
  -i, --interactive        prompt for input even if stdin is not a terminal
  -o, --option=name=value  override a setting; may be repeated
  -V, --version            display version information and exit

Settings:
  max_jobs=N               jobs tracked at the same time (1 to 1000, default 100)
  max_pipeline_stages=N    commands in one pipeline (1 to 1000, default 50)
  notify=on|off            report finished background jobs before each prompt
  job_control=on|off       hand the terminal to foreground jobs

Builtins: bg, export, fg, jobs [-l], kill, ps, wait";

pub fn long_help_message() -> String {
    format!("{DESCRIPTOR}\n{USAGE_MSG}\n\n{HELP_MSG}")
}
