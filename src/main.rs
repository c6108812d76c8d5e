mod cli;

#[tokio::main]
async fn main() {
    coldwatch::logging::init();
    let code = match cli::run() {
        cli::RunOutcome::Run(config, command) => cli::execute(config, command).await,
        cli::RunOutcome::Exit(code) => code,
    };
    std::process::exit(code);
}
