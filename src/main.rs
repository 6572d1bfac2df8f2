fn main() {
    #[cfg(feature = "cli")]
    deltachain::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("deltachain: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
