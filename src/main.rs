use clap::Parser;
use netzp::ui::{run, NetzpArgs};

pub fn main() {
    env_logger::init();

    let args = NetzpArgs::parse();
    if let Err(err) = run(&args) {
        eprintln!("netzp: {err:#}");
        std::process::exit(1);
    }
}
