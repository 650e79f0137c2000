fn main() {
    if let Err(err) = warehouse_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
