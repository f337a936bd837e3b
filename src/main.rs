fn main() -> Result<(), Box<dyn std::error::Error>> {
    refchat::cli::main()
}
