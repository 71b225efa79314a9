use std::path::Path;

// Return the first existing path given a list of paths as string slices
fn get_first_path(paths: &[&'static str]) -> Option<&'static str> {
    paths.iter().find(|p| Path::new(p).exists()).copied()
}

fn main() {
    // Children need a usable PATH even when the shell was started with an empty environment.
    let path_default = match get_first_path(&["/usr/local/bin", "/usr/bin"]) {
        Some("/usr/local/bin") => "/usr/local/bin:/usr/bin:/bin:/usr/local/sbin:/usr/sbin:/sbin",
        _ => "/usr/bin:/bin:/usr/sbin:/sbin",
    };

    println!("cargo:rustc-env=JOBSH_PATH_DEFAULT={path_default}");
    println!("cargo:rerun-if-changed=build.rs");
}
