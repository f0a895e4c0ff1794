//! `rmtree`: create or validate mtree-style directory hierarchy manifests.
//!
//! Wiring follows `paketkoll`'s `main.rs`: parse with `clap`, set up
//! `tracing` once, delegate to the library crates, and fold the outcome
//! into a single `proc_exit::Code` at the end.

mod cli;

use anyhow::Context as _;
use clap::Parser as _;
use cli::Cli;
use cli::ResultFormat;
use mtree_core::keyword::Registry;
use mtree_core::Manifest;
use proc_exit::Code;
use proc_exit::Exit;
use std::io::Read;
use std::io::Write as _;

fn main() -> anyhow::Result<Exit> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if cli.list_keywords {
        print_keyword_list(&Registry::builtin());
        return Ok(Exit::new(Code::SUCCESS));
    }
    if let Some(path) = &cli.list_used {
        print_used_keywords(path, cli.result_format)?;
        return Ok(Exit::new(Code::SUCCESS));
    }

    if !cli.create && cli.spec_file.is_none() {
        eprintln!("rmtree: neither validating nor creating a manifest");
        return Ok(Exit::new(Code::FAILURE));
    }

    let registry = Registry::builtin();
    let keywords = resolve_keywords(&cli, &registry);

    if cli.create {
        let manifest = build_manifest(&cli, &keywords)?;
        let stdout = std::io::stdout();
        manifest.write_to(stdout.lock())?;
        return Ok(Exit::new(Code::SUCCESS));
    }

    let spec_path = cli.spec_file.as_ref().expect("checked above");
    let spec_text = std::fs::read(spec_path).with_context(|| format!("reading spec file {}", spec_path.display()))?;
    let spec = Manifest::parse(&spec_text[..])?;
    let target = build_manifest(&cli, &keywords)?;

    let config = mtree_check::CheckConfig::builder()
        .keywords(keywords)
        .registry(registry)
        .build()
        .expect("all CheckConfig fields have defaults");
    let result = mtree_check::check_manifests(&spec, &target, &config)?;

    render_result(&result, cli.result_format)?;
    Ok(if result.is_clean() {
        Exit::new(Code::SUCCESS)
    } else {
        Exit::new(Code::FAILURE)
    })
}

fn init_tracing(debug_flag: bool) {
    let debug = debug_flag || std::env::var("DEBUG").is_ok_and(|v| v == "1");
    let default_level = if debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string()));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn split_keyword_list(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_keywords(cli: &Cli, registry: &Registry) -> Vec<String> {
    let is_tar = cli.tar.is_some();
    let mut keywords: Vec<String> = match &cli.keywords {
        Some(raw) => {
            let mut list = split_keyword_list(raw);
            if !list.iter().any(|k| k == "type") {
                list.insert(0, "type".to_string());
            }
            list
        }
        None if is_tar => Registry::default_tar_keyword_set().iter().map(ToString::to_string).collect(),
        None => Registry::default_keyword_set().iter().map(ToString::to_string).collect(),
    };
    if let Some(raw) = &cli.add_keywords {
        for kw in split_keyword_list(raw) {
            if !keywords.contains(&kw) {
                keywords.push(kw);
            }
        }
    }
    if cli.bsd_keywords {
        keywords.retain(|kw| {
            let keep = registry.is_bsd(kw);
            if !keep {
                eprintln!("INFO: ignoring \"{kw}\" as it is not an upstream keyword");
            }
            keep
        });
    }
    keywords
}

fn build_manifest(cli: &Cli, keywords: &[String]) -> anyhow::Result<Manifest> {
    if let Some(tar_path) = &cli.tar {
        let config = mtree_tar::TarStreamConfig::builder()
            .keywords(keywords.to_vec())
            .build()
            .expect("all TarStreamConfig fields have defaults");
        let mut streamer = if tar_path == "-" {
            mtree_tar::TarStreamer::new(Box::new(std::io::stdin()) as Box<dyn Read>, config)
        } else {
            let file = std::fs::File::open(tar_path).with_context(|| format!("opening tar archive {tar_path}"))?;
            mtree_tar::TarStreamer::new(Box::new(file) as Box<dyn Read>, config)
        };
        std::io::copy(&mut streamer, &mut std::io::sink())?;
        streamer.close()?;
        Ok(streamer.hierarchy()?.clone())
    } else {
        let config = mtree_fs::WalkConfig::builder()
            .keywords(keywords.to_vec())
            .build()
            .expect("all WalkConfig fields have defaults");
        Ok(mtree_fs::walk(&cli.root, &config)?)
    }
}

fn print_keyword_list(registry: &Registry) {
    for descriptor in registry.enumerate() {
        let annotation = if descriptor.is_default {
            " (default)"
        } else if !descriptor.is_bsd {
            " (not upstream)"
        } else {
            ""
        };
        println!("{}{annotation}", descriptor.name);
    }
}

fn print_used_keywords(path: &std::path::Path, format: ResultFormat) -> anyhow::Result<()> {
    let text = std::fs::read(path).with_context(|| format!("reading manifest {}", path.display()))?;
    let manifest = Manifest::parse(&text[..])?;
    let registry = Registry::builtin();
    let used = mtree_core::collect_used_keywords(&manifest);

    if format == ResultFormat::Json {
        let rendered: Vec<serde_json::Value> = used
            .iter()
            .map(|kw| {
                serde_json::json!({
                    "keyword": kw,
                    "supported": registry.lookup(kw).is_some(),
                })
            })
            .collect();
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &rendered)?;
        writeln!(out)?;
        return Ok(());
    }

    for kw in used {
        if registry.lookup(&kw).is_some() {
            println!("{kw}");
        } else {
            println!("{kw} (unsupported)");
        }
    }
    Ok(())
}

fn render_result(result: &mtree_check::CheckResult, format: ResultFormat) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        ResultFormat::Bsd => {
            for d in &result.discrepancies {
                match d {
                    mtree_check::Discrepancy::Failure {
                        path,
                        keyword,
                        expected,
                        observed,
                    } => writeln!(
                        out,
                        "{}: {keyword} ({}, {})",
                        path.display(),
                        String::from_utf8_lossy(expected),
                        String::from_utf8_lossy(observed)
                    )?,
                    mtree_check::Discrepancy::Missing { path } => writeln!(out, "{}: missing", path.display())?,
                    mtree_check::Discrepancy::Extra { path } => writeln!(out, "{}: extra", path.display())?,
                }
            }
        }
        ResultFormat::Json => {
            let rendered: Vec<serde_json::Value> = result
                .discrepancies
                .iter()
                .map(|d| match d {
                    mtree_check::Discrepancy::Failure {
                        path,
                        keyword,
                        expected,
                        observed,
                    } => serde_json::json!({
                        "kind": "failure",
                        "path": path.display().to_string(),
                        "keyword": keyword,
                        "expected": String::from_utf8_lossy(expected),
                        "observed": String::from_utf8_lossy(observed),
                    }),
                    mtree_check::Discrepancy::Missing { path } => serde_json::json!({
                        "kind": "missing",
                        "path": path.display().to_string(),
                    }),
                    mtree_check::Discrepancy::Extra { path } => serde_json::json!({
                        "kind": "extra",
                        "path": path.display().to_string(),
                    }),
                })
                .collect();
            serde_json::to_writer_pretty(&mut out, &rendered)?;
            writeln!(out)?;
        }
        ResultFormat::Path => {
            for d in &result.discrepancies {
                writeln!(out, "{}", d.path().display())?;
            }
        }
    }
    Ok(())
}
