use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "reson8-server", about = "Reson8 signaling server")]
pub struct Args {
    /// Path to the TOML config file; generated with defaults if missing.
    #[arg(short, long, default_value = "./reson8.toml")]
    pub config: String,
}
