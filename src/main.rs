use clap::Parser;
use warden::{
    cli::{Args, PolicyLoader},
    runtime::execute_with_policy,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    if args.command.is_empty() {
        eprintln!("Error: Command is required");
        std::process::exit(1);
    }

    let policy = PolicyLoader::load(&args)?;

    let command = &args.command[0];
    let command_args: Vec<&str> = args.command[1..].iter().map(String::as_str).collect();

    let exit_code = execute_with_policy(command, &command_args, &policy).await?;
    std::process::exit(exit_code);
}
