//! Build automation tasks for the rust-mysqlx workspace.
//!
//! Run with `cargo xtask <command>`.
//!
//! ## Available Commands
//!
//! - `ci`: Run all CI checks (format, lint, test)
//! - `fmt`: Check/apply code formatting
//! - `clippy`: Run clippy lints
//! - `test`: Run all tests, optionally the ones needing a live server
//! - `doc`: Generate documentation
//! - `bench`: Run benchmarks
//! - `fuzz`: Run fuzz tests (requires cargo-fuzz + nightly)
//! - `coverage`: Run code coverage (requires cargo-llvm-cov)
//! - `package`: Package the publishable crates

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Crates published to crates.io, in dependency order.
const PUBLISHED: [&str; 6] = [
    "mysqlx-protocol",
    "mysqlx-types",
    "mysqlx-codec",
    "mysqlx-auth",
    "mysqlx-tls",
    "mysqlx-client",
];

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for rust-mysqlx")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks (format, lint, test)
    Ci,
    /// Run cargo fmt (--check by default, --fix to apply)
    Fmt {
        /// Apply formatting fixes
        #[arg(long)]
        fix: bool,
    },
    /// Run clippy on every target
    Clippy {
        /// Apply clippy suggestions
        #[arg(long)]
        fix: bool,
    },
    /// Run all tests
    Test {
        /// Test a specific package
        #[arg(short, long)]
        package: Option<String>,
        /// Also run the ignored tests against the server in MYSQLX_HOST
        #[arg(long)]
        live: bool,
    },
    /// Generate documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Run benchmarks
    Bench {
        /// Benchmark filter pattern
        filter: Option<String>,
    },
    /// Run fuzz tests (requires cargo-fuzz + nightly)
    Fuzz {
        /// Fuzz target to run
        #[arg(default_value = "parse_frame")]
        target: String,
        /// Maximum runtime in seconds
        #[arg(long, default_value = "60")]
        max_time: u64,
        /// List available fuzz targets
        #[arg(long)]
        list: bool,
    },
    /// Run code coverage
    Coverage {
        /// Output format (html, lcov, json)
        #[arg(long, default_value = "html")]
        format: String,
    },
    /// Package the publishable crates
    Package,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh, false)?;
            clippy(&sh, false)?;
            test(&sh, None, false)?;
            println!("\n✅ All CI checks passed!");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy { fix } => clippy(&sh, fix)?,
        Command::Test { package, live } => test(&sh, package.as_deref(), live)?,
        Command::Doc { open } => doc(&sh, open)?,
        Command::Bench { filter } => bench(&sh, filter.as_deref())?,
        Command::Fuzz {
            target,
            max_time,
            list,
        } => fuzz(&sh, &target, max_time, list)?,
        Command::Coverage { format } => coverage(&sh, &format)?,
        Command::Package => package(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        println!("Applying formatting...");
        cmd!(sh, "cargo fmt --all").run()?;
    } else {
        println!("Checking formatting...");
        cmd!(sh, "cargo fmt --all -- --check").run()?;
    }
    println!("✅ Formatting done.");
    Ok(())
}

fn clippy(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        println!("Applying clippy suggestions...");
        cmd!(sh, "cargo clippy --all-targets --fix --allow-dirty").run()?;
    } else {
        println!("Running clippy...");
        cmd!(sh, "cargo clippy --all-targets -- -D warnings").run()?;
    }
    println!("✅ Clippy done.");
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>, live: bool) -> Result<()> {
    println!("Running tests...");

    let mut args = vec!["test"];
    if let Some(pkg) = package {
        args.push("-p");
        args.push(pkg);
    }
    if live {
        if std::env::var_os("MYSQLX_HOST").is_none() {
            bail!("--live needs MYSQLX_HOST (and usually MYSQLX_USER/MYSQLX_PASSWORD)");
        }
        args.extend(["--", "--include-ignored"]);
    }

    cmd!(sh, "cargo {args...}").run()?;
    println!("✅ All tests passed.");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    println!("Generating documentation...");
    if open {
        cmd!(sh, "cargo doc --no-deps --open").run()?;
    } else {
        cmd!(sh, "cargo doc --no-deps").run()?;
    }
    println!("✅ Documentation generated.");
    Ok(())
}

fn bench(sh: &Shell, filter: Option<&str>) -> Result<()> {
    println!("Running benchmarks...");
    if let Some(f) = filter {
        cmd!(sh, "cargo bench -- {f}").run()?;
    } else {
        cmd!(sh, "cargo bench").run()?;
    }
    Ok(())
}

fn fuzz(sh: &Shell, target: &str, max_time: u64, list: bool) -> Result<()> {
    let targets_dir = sh.current_dir().join("fuzz").join("fuzz_targets");
    if !targets_dir.exists() {
        bail!("fuzz targets not found at {}", targets_dir.display());
    }

    if list {
        println!("Available fuzz targets:");
        for entry in fs::read_dir(&targets_dir)? {
            if let Some(name) = entry?.path().file_stem() {
                println!("  - {}", name.to_string_lossy());
            }
        }
        return Ok(());
    }

    println!("Running fuzz target: {target} for {max_time} seconds");
    let max_time_str = max_time.to_string();
    let _dir = sh.push_dir("fuzz");
    cmd!(
        sh,
        "cargo +nightly fuzz run {target} -- -max_total_time={max_time_str}"
    )
    .run()?;
    Ok(())
}

fn coverage(sh: &Shell, format: &str) -> Result<()> {
    println!("Running code coverage...");

    match format {
        "html" => {
            cmd!(sh, "cargo llvm-cov --html").run()?;
            println!("✅ Coverage report: target/llvm-cov/html/index.html");
        }
        "lcov" => {
            cmd!(sh, "cargo llvm-cov --lcov --output-path target/lcov.info").run()?;
            println!("✅ Coverage report: target/lcov.info");
        }
        "json" => {
            cmd!(sh, "cargo llvm-cov --json --output-path target/coverage.json").run()?;
            println!("✅ Coverage report: target/coverage.json");
        }
        _ => bail!("Unknown coverage format: {format}. Use html, lcov, or json."),
    }
    Ok(())
}

fn package(sh: &Shell) -> Result<()> {
    println!("Packaging crates...");
    for crate_name in PUBLISHED {
        cmd!(sh, "cargo package -p {crate_name} --allow-dirty").run()?;
    }
    println!("✅ Packages: target/package/");
    Ok(())
}
