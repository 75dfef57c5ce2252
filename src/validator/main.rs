//! Standalone validator for ecosystem configuration files.
//!
//! This tool validates JSON configuration files for the supervisor,
//! checking for proper structure, unique names, and existing entry points.

use std::process::ExitCode;

use clap::Parser;

// Import from the main crate
use appkeeper::config::EcosystemConfig;

/// Ecosystem configuration validator.
#[derive(Parser, Debug)]
#[command(name = "validate_ecosystem")]
#[command(about = "Validates ecosystem configuration files for the process supervisor")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file to validate.
    #[arg(short, long, default_value = "ecosystem.json")]
    file: String,

    /// Generate an example configuration file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show detailed information for each app.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Handle example generation
    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    // Validate the configuration file
    validate_config(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = EcosystemConfig::example();

    match example.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Example configuration written to: {output_path}");
            println!("\nThe file contains {} example app(s).", example.len());
            println!("Edit the script, interpreter, and env entries for your application.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_config(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    // Load the configuration
    let config = match EcosystemConfig::load_from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Validate all apps
    let results = config.validate_all();

    let mut errors = 0;
    let mut warnings = 0;

    for (i, result) in results.iter().enumerate() {
        let Some(app) = config.get(i) else {
            // NoApps produces a single result with no matching app entry
            errors += 1;
            if let Err(e) = result {
                println!("✗ Error: {e}");
            }
            continue;
        };

        if verbose {
            println!(
                "[{}] script: {} (interpreter: {}, watch: {}, {} env var(s))",
                app.name,
                app.script.display(),
                app.interpreter.as_deref().unwrap_or("none"),
                app.watch,
                app.env.len()
            );
        }

        match result {
            Ok(()) => {
                // Empty env values usually mean a secret was never filled in
                let empty_keys: Vec<&str> = app
                    .env
                    .iter()
                    .filter(|(_, v)| v.is_empty())
                    .map(|(k, _)| k.as_str())
                    .collect();

                if empty_keys.is_empty() {
                    if verbose {
                        println!("  ✓ OK");
                    }
                } else {
                    warnings += 1;
                    if verbose {
                        println!(
                            "  ⚠ Warning: empty value(s) for: {}",
                            empty_keys.join(", ")
                        );
                    }
                }
            }
            Err(e) => {
                errors += 1;
                println!("  ✗ Error: {e}");
            }
        }
    }

    println!();

    // Summary
    let total = config.len();
    let valid = total.saturating_sub(errors);

    if errors == 0 {
        println!("✓ All {total} app(s) are valid!");

        if warnings > 0 {
            println!("  ({warnings} warning(s) - apps with empty environment values)");
        }

        ExitCode::SUCCESS
    } else {
        println!("✗ Validation failed: {errors} error(s) in {total} app(s)");
        println!("  Valid: {valid}/{total}");

        ExitCode::FAILURE
    }
}
