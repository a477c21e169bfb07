// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paginator command-line entry point.
//
//   paginator build "<TITLE>"   composite a folder of page images into a PDF
//   paginator serve             run the job agent for the web client
//   paginator inspect <PDF>     page count and page sizes of a PDF

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use paginator_agent::{AGENT_VERSION, AgentServer, AgentSettings, ApiKey};
use paginator_core::PaginatorConfig;
use paginator_core::error::{PaginatorError, Result};
use paginator_core::human_errors::humanize_error;
use paginator_core::types::{DocumentOutput, Progress};
use paginator_document::{
    AssetBundle, CancellationToken, JobInput, PdfReader, page_label, run_job, scan_pages,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "paginator", version, about = "Number, title and bind page images into a PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Composite the numbered page images in a folder into one PDF.
    Build {
        /// Title printed in the header of every page after the cover.
        title: String,
        /// Folder holding the page images and the template/font assets.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Where to write the PDF [default: <DIR>/final_document.pdf].
        #[arg(long)]
        output: Option<PathBuf>,
        /// JSON config file with asset paths and layout.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the job agent until Ctrl-C.
    Serve {
        /// Listening port [default: 3838, or PORT].
        #[arg(long, env = "PAGINATOR_PORT")]
        port: Option<u16>,
        /// Shared API key; generated and saved when not given.
        #[arg(long, env = "PAGINATOR_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Base folder for assets and the output directory.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Print the page count and page sizes of a PDF.
    Inspect { pdf: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = humanize_error(&err);
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            debug!(error = %err, retriable = human.retriable, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Build {
            title,
            dir,
            output,
            config,
        } => {
            let output = build(&title, &dir, output, config.as_deref())?;
            println!(
                "Wrote {} ({} pages, sha256 {})",
                output.path.display(),
                output.page_count,
                output.sha256
            );
            Ok(())
        }
        Command::Serve {
            port,
            api_key,
            config,
            dir,
        } => {
            let port = port.or_else(|| std::env::var("PORT").ok()?.parse().ok());
            let api_key = api_key.or_else(|| std::env::var("API_KEY").ok());
            tokio::runtime::Runtime::new()?.block_on(serve(port, api_key, config.as_deref(), &dir))
        }
        Command::Inspect { pdf } => inspect(&pdf),
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

/// Local batch mode: discover pages under `dir` and write one PDF.
fn build(
    title: &str,
    dir: &Path,
    output: Option<PathBuf>,
    config: Option<&Path>,
) -> Result<DocumentOutput> {
    let config = PaginatorConfig::load_or_default(config)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(PaginatorError::InvalidRequest(
            "Document title is required".into(),
        ));
    }

    let assets = AssetBundle::load(&config.assets, dir)?;
    let pages = scan_pages(dir)?;
    if pages.is_empty() {
        return Err(PaginatorError::NoPages);
    }

    println!("Found {} pages:", pages.len());
    for page in &pages {
        println!("  {}  {}", page_label(page.ordinal), page.origin);
    }

    let destination = output.unwrap_or_else(|| dir.join(&config.output_file_name));
    let mut report = |progress: Progress| {
        println!(
            "  [{}/{}] {} done",
            progress.current,
            progress.total,
            page_label(progress.page)
        );
    };

    run_job(
        JobInput::new(title, pages),
        &assets,
        &config.layout,
        &destination,
        &mut report,
        &CancellationToken::new(),
    )
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn serve(
    port: Option<u16>,
    api_key: Option<String>,
    config: Option<&Path>,
    dir: &Path,
) -> Result<()> {
    let config = PaginatorConfig::load_or_default(config)?;
    let assets = AssetBundle::load(&config.assets, dir)?;
    let output_dir = dir.join(&config.server.output_dir);
    let configured = api_key.or(config.server.api_key);
    let (api_key, saved_to) = ApiKey::resolve(configured.as_deref(), &output_dir)?;

    let mut server = AgentServer::new(AgentSettings {
        port: port.unwrap_or(config.server.port),
        output_dir: output_dir.clone(),
        api_key: api_key.clone(),
        assets,
        layout: config.layout,
    });
    let addr = server.start().await?;

    println!("Paginator agent {AGENT_VERSION} listening on port {}", addr.port());
    println!("  API key: {}", api_key.as_str());
    if let Some(path) = saved_to {
        println!("  (generated, saved to {})", path.display());
    }
    println!("  Output:  {}", output_dir.display());
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| PaginatorError::Server(format!("waiting for Ctrl-C: {e}")))?;
    info!("shutdown requested");
    server.stop().await
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

fn inspect(pdf: &Path) -> Result<()> {
    let reader = PdfReader::open(pdf)?;
    println!("{}: {} pages", pdf.display(), reader.page_count());
    for (index, (width, height)) in reader.page_sizes()?.into_iter().enumerate() {
        println!("  page {:>3}: {width:.1} x {height:.1} pt", index + 1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use image::{Rgba, RgbaImage};
    use paginator_core::types::AssetRole;

    const FONT: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");

    fn save_png(path: &Path, image: RgbaImage) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        image.save(path).expect("save png");
    }

    /// A folder laid out the way `build` expects with the default config.
    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        save_png(
            &root.join("Header and Footer Template.png"),
            RgbaImage::from_fn(200, 300, |_, y| {
                if y < 30 || y >= 270 {
                    Rgba([20, 40, 90, 255])
                } else {
                    Rgba([0, 0, 0, 0])
                }
            }),
        );
        std::fs::create_dir_all(root.join("fonts")).expect("mkdir fonts");
        std::fs::write(root.join("fonts/Roboto-Regular.ttf"), FONT).expect("font");
        std::fs::write(root.join("fonts/SourceSansPro-Regular.ttf"), FONT).expect("font");
        dir
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_arguments_parse() {
        let cli = Cli::try_parse_from(["paginator", "build", "SAMPLE", "--dir", "pages"])
            .expect("parse");
        match cli.command {
            Command::Build {
                title, dir, output, ..
            } => {
                assert_eq!(title, "SAMPLE");
                assert_eq!(dir, PathBuf::from("pages"));
                assert!(output.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["paginator", "build"]).is_err(), "title is required");
    }

    #[test]
    fn build_writes_default_output_in_page_order() {
        let dir = workspace();
        let solid = |w, h, [r, g, b]: [u8; 3]| RgbaImage::from_pixel(w, h, Rgba([r, g, b, 255]));
        save_png(&dir.path().join("2_body.png"), solid(100, 150, [200, 0, 0]));
        save_png(&dir.path().join("chapter/3_more.png"), solid(100, 150, [0, 200, 0]));
        save_png(&dir.path().join("1_cover.png"), solid(120, 160, [0, 0, 0]));

        let output = build("SAMPLE", dir.path(), None, None).expect("build");
        assert_eq!(output.path, dir.path().join("final_document.pdf"));
        assert_eq!(output.page_count, 3);

        let reader = PdfReader::open(&output.path).expect("open");
        assert_eq!(reader.page_count(), 3);
        let sizes = reader.page_sizes().expect("sizes");
        // Cover keeps its own size; the rest take the template's.
        let expected_sizes = [(90.0, 120.0), (150.0, 225.0), (150.0, 225.0)];
        for (actual, expected) in sizes.iter().zip(expected_sizes) {
            assert!((actual.0 - expected.0).abs() < 0.5, "{actual:?} vs {expected:?}");
            assert!((actual.1 - expected.1).abs() < 0.5, "{actual:?} vs {expected:?}");
        }
        assert!(inspect(&output.path).is_ok());
    }

    #[test]
    fn build_reports_missing_template_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = build("SAMPLE", dir.path(), None, None).expect_err("no assets");
        assert!(matches!(
            err,
            PaginatorError::MissingAsset {
                role: AssetRole::Template,
                ..
            }
        ));
    }

    #[test]
    fn build_without_pages_fails() {
        let dir = workspace();
        let err = build("SAMPLE", dir.path(), None, None).expect_err("no pages");
        assert!(matches!(err, PaginatorError::NoPages));
        assert!(!dir.path().join("final_document.pdf").exists());
    }

    #[test]
    fn blank_title_is_rejected() {
        let dir = workspace();
        let cover = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        save_png(&dir.path().join("1_cover.png"), cover);
        let err = build("   ", dir.path(), None, None).expect_err("blank title");
        assert!(matches!(err, PaginatorError::InvalidRequest(_)));
    }
}
