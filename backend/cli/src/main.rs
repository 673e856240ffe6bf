mod config;
mod report;
mod sitelist;
mod terminal_output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use vendorscope_browser::CdpBrowser;
use vendorscope_config::{config_file_path, load_and_prepare};
use vendorscope_consent::SiteValidator;

use config::{BrowserTarget, CliOverrides, Config};
use terminal_output::{note_error, note_info, note_success, render_run, supports_color};

#[derive(Parser, Debug)]
#[command(name = "vendorscope")]
#[command(about = "Check whether a vendor ends up in the TCF consent string after accepting all")]
#[command(version)]
struct Cli {
    /// IAB vendor ID to look for
    vendor_id: Option<String>,

    /// Site list file (same as --site-list)
    #[arg(value_name = "SITE_LIST", conflicts_with = "site_list")]
    site_list_pos: Option<PathBuf>,

    /// Site list file, one domain or URL per line
    #[arg(long, alias = "siteList", value_name = "PATH")]
    site_list: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headfull: bool,

    /// Config file [default: $VENDORSCOPE_CONFIG or ./config.yml]
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the CSV report
    #[arg(long, value_name = "DIR")]
    results_dir: Option<PathBuf>,

    /// Log level filter, e.g. info or vendorscope_consent=debug
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Attach to a running browser instead of launching one
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            vendor_id: self.vendor_id.clone(),
            site_list: self.site_list.clone().or_else(|| self.site_list_pos.clone()),
            headfull: self.headfull,
            results_dir: self.results_dir.clone(),
            log_level: self.log_level.clone(),
            ws_endpoint: self.ws_endpoint.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run aborted");
            note_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = config_file_path(cli.config.as_deref());
    let prepared = load_and_prepare(&config_path).await?;
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    // Logging needs the resolved level, so config warnings wait for the
    // subscriber.
    let config = Config::resolve(&cli.overrides(), prepared.config, &config_dir)?;
    vendorscope_logging::init_logger(&config.log_dir, &config.log_level)?;
    for warning in &prepared.warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }

    let sites = sitelist::load_site_list(&config.site_list).await?;
    note_info(&format!(
        "Checking vendor {} on {} sites from {}",
        config.vendor_id,
        sites.len(),
        config.site_list.display()
    ));

    let browser = match &config.browser {
        BrowserTarget::Launch(options) => {
            note_info(if config.headless {
                "Launching headless browser"
            } else {
                "Launching browser window"
            });
            CdpBrowser::launch(options).await.context("Failed to start browser")?
        }
        BrowserTarget::Attach(endpoint) => {
            note_info(&format!("Attaching to browser at {endpoint}"));
            CdpBrowser::connect(endpoint)
                .await
                .context("Failed to attach to browser")?
        }
    };
    match browser.version().await {
        Ok(product) => info!(browser = %product, "Browser ready"),
        Err(e) => warn!(error = %e, "Could not read browser version"),
    }

    let context = browser.new_context().await;
    let context = match context {
        Ok(context) => context,
        Err(e) => {
            browser.close().await;
            return Err(e).context("Failed to create browsing context");
        }
    };

    let validator = SiteValidator::new(config.timeouts);
    let run = validator.run(&context, &sites, config.vendor_id).await;

    if let Err(e) = context.dispose().await {
        warn!(error = %e, "Failed to dispose browsing context");
    }
    browser.close().await;

    let path = report::write_csv(&config.results_dir, &run).await?;
    info!(path = %path.display(), "Results written");

    print!("\n{}", render_run(&run, supports_color()));
    note_success(&format!("Results saved to {}", path.display()));
    Ok(())
}
