use clap::Parser;
use std::io::Read;

use rexxlang::rexx::{Interpreter, RexxOptions};

#[derive(Parser)]
#[command(name = "rexx")]
#[command(about = "An embeddable Rexx-family scripting language interpreter")]
#[command(version)]
struct Cli {
    /// Execute the script from command line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Output results as JSON (stdout, stderr, exitCode)
    #[arg(long = "json")]
    json: bool,

    /// Positional arguments passed to the script, readable via ARG(n)
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: Cannot read script file: {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("Error: No script provided. Use -c 'script', provide a script file, or pipe via stdin.");
            std::process::exit(1);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    if script.trim().is_empty() {
        if cli.json {
            println!("{}", serde_json::json!({"stdout": "", "stderr": "", "exitCode": 0}));
        }
        std::process::exit(0);
    }

    let mut interp = Interpreter::new(RexxOptions {
        argv: Some(cli.args),
        ..Default::default()
    });

    let result = interp.exec(&script).await;

    if cli.json {
        println!("{}", serde_json::json!({
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exitCode": result.exit_code,
        }));
    } else {
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
    }

    std::process::exit(result.exit_code);
}
