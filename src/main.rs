use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use mediascope::{
    analysis::{self, AnalysisError, AnalyzerSettings},
    cli,
    config,
    constants::MIB,
    engine::{ContainerProbe, MetadataEngine},
    format,
    logging,
    report::{self, ExportRecord},
    source::{ByteSource, LocalFile, ReadError},
    util,
};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let cfg = loaded.config;

    let mut settings = AnalyzerSettings::from_config(&cfg);
    if let Some(mib) = cli_opts.whole_buffer_limit_mib {
        settings.whole_buffer_limit = mib.saturating_mul(MIB).min(settings.max_file_bytes);
        info!(
            "whole-buffer limit set to {} by CLI",
            format::file_size(settings.whole_buffer_limit)
        );
    }

    let source = match LocalFile::open(&cli_opts.input) {
        Ok(source) => source,
        Err(err) => {
            let err = AnalysisError::from(ReadError::from(err));
            bail!("{}: {}", cli_opts.input.display(), err.user_message());
        }
    };
    info!(
        "starting input={} size={}",
        cli_opts.input.display(),
        format::file_size(source.len())
    );

    let moov_limit = cfg.moov_read_limit;
    let job = analysis::worker::spawn_analysis(
        move || Ok(Box::new(ContainerProbe::new(moov_limit)) as Box<dyn MetadataEngine>),
        settings,
        Box::new(source),
    );

    let mut stderr = std::io::stderr();
    for update in job.progress.iter() {
        if cli_opts.no_progress {
            continue;
        }
        let _ = write!(stderr, "\r\x1b[2K[{:>5.1}%] {}", update.percent, update.message);
        let _ = stderr.flush();
    }
    if !cli_opts.no_progress {
        let _ = writeln!(stderr);
    }

    let media_report = match job.join() {
        Ok(media_report) => media_report,
        Err(err) => {
            warn!("analysis failed: {err}");
            bail!("{}", err.user_message());
        }
    };

    if cli_opts.raw {
        println!("{}", serde_json::to_string_pretty(&media_report)?);
    } else {
        println!("File: {}", cli_opts.input.display());
        println!();
        print!("{}", report::render_text(&media_report));
    }

    let export_path = match (&cli_opts.export, &cli_opts.export_dir) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(dir)) => Some(util::export_path_in(dir, &cli_opts.input)?),
        (None, None) => None,
    };
    if let Some(path) = export_path {
        let record = ExportRecord {
            source_path: cli_opts.input.display().to_string(),
            tool_version: env!("CARGO_PKG_VERSION"),
            config_hash: &loaded.config_hash,
            exported_at: chrono::Utc::now(),
            report: &media_report,
        };
        report::export_json(&path, &record)
            .with_context(|| format!("writing export {}", path.display()))?;
        info!("exported report to {}", path.display());
    }

    Ok(())
}
