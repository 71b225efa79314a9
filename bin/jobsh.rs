fn main() {
    jobsh::main()
}
