use clap::Parser;
use token_cli::{execute_cmd, setup_logging, CmdConfig};

// CLI
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let cmd = CmdConfig::parse();
    if cmd.logs {
        setup_logging();
    }

    if let Err(err) = execute_cmd(&cmd).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
    Ok(())
}
