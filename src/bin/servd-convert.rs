use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use servd::persist::{convert_style, Persistable, Style};
use servd::PluginRegistry;

#[derive(Parser)]
#[command(name = "servd-convert")]
#[command(about = "Convert a servd application file between storage styles", long_about = None)]
struct Cli {
    /// The filename of the application to convert
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Where to write the converted application
    #[arg(short = 'o', long = "out")]
    output: PathBuf,

    /// Style of the input file: binary, json, source, definition, or guess
    #[arg(short = 'f', long = "typein", default_value = "guess")]
    typein: String,

    /// Style of the output file: binary, json or source
    #[arg(short = 't', long = "typeout", default_value = "source")]
    typeout: Style,

    /// The input file is encrypted
    #[arg(short, long)]
    decrypt: bool,

    /// Encrypt the output file
    #[arg(short, long)]
    encrypt: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match convert(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("servd-convert: {e}");
            ExitCode::FAILURE
        }
    }
}

fn convert(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let style_in = if cli.typein == "guess" {
        Style::from_extension(&cli.input)
            .ok_or_else(|| format!("cannot guess the style of {}; pass --typein", cli.input.display()))?
    } else {
        cli.typein.parse()?
    };

    let passphrase_in = if cli.decrypt {
        Some(rpassword::prompt_password("Passphrase: ")?)
    } else {
        None
    };
    let passphrase_out = if cli.encrypt {
        let first = rpassword::prompt_password("Encryption passphrase: ")?;
        let second = rpassword::prompt_password("Confirm encryption passphrase: ")?;
        if first != second {
            return Err("passphrases do not match".into());
        }
        Some(first)
    } else {
        None
    };

    let input = Persistable::new(&cli.input, style_in).with_passphrase(passphrase_in);
    let output = Persistable::new(&cli.output, cli.typeout).with_passphrase(passphrase_out);

    let descriptor = convert_style(&input, &output, &PluginRegistry::builtin())?;
    println!(
        "Converted application {:?} ({} services) from {} to {}",
        descriptor.name,
        descriptor.services.len(),
        style_in,
        cli.typeout
    );
    Ok(())
}
