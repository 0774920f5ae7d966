fn main() {
    binder_cli::run_main();
}
