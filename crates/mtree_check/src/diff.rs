//! The checker's comparison algorithm (spec.md §4.5).
//!
//! Path alignment is grounded on `konfigkoll_core::diff::comm`, which
//! already does a sorted three-way split for configuration drift
//! reporting via `itertools::Itertools::merge_join_by`; this generalizes
//! that primitive from instruction lists to manifest path maps.

use crate::error::CheckError;
use crate::result::CheckResult;
use crate::result::Discrepancy;
use crate::result::MISSING_MARKER;
use itertools::EitherOrBoth;
use itertools::Itertools as _;
use mtree_core::keyword::Registry;
use mtree_core::CancellationToken;
use mtree_core::Manifest;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct CheckConfig {
    #[builder(default = "Registry::default_keyword_set().iter().map(|s| s.to_string()).collect()")]
    pub keywords: Vec<String>,
    #[builder(default = "Registry::builtin()")]
    pub registry: Registry,
}

impl CheckConfig {
    pub fn builder() -> CheckConfigBuilder {
        CheckConfigBuilder::default()
    }

    pub(crate) fn validate_keywords(&self) -> Result<(), CheckError> {
        for kw in &self.keywords {
            if self.registry.lookup(kw).is_none() {
                return Err(CheckError::UnknownKeyword(kw.clone()));
            }
        }
        Ok(())
    }
}

/// Walk `root` with `config.keywords` and diff the result against `spec`
/// (spec.md §4.5's `Check`).
pub fn check(root: &std::path::Path, spec: &Manifest, config: &CheckConfig) -> Result<CheckResult, CheckError> {
    check_cancellable(root, spec, config, &())
}

/// As [`check`], but checked against a cooperative cancellation probe
/// between paths (spec.md §5).
pub fn check_cancellable(
    root: &std::path::Path,
    spec: &Manifest,
    config: &CheckConfig,
    cancel: &dyn CancellationToken,
) -> Result<CheckResult, CheckError> {
    config.validate_keywords()?;
    let walk_config = mtree_fs::WalkConfig::builder()
        .keywords(config.keywords.clone())
        .registry(config.registry.clone())
        .build()
        .expect("all WalkConfig fields have defaults");
    let target = mtree_fs::walk_cancellable(root, &walk_config, cancel)?;
    diff(spec, &target, &config.keywords, cancel)
}

/// Diff two already-built manifests (spec.md §4.5's `TarCheck`; also usable
/// to compare two filesystem-derived manifests directly).
pub fn check_manifests(spec: &Manifest, target: &Manifest, config: &CheckConfig) -> Result<CheckResult, CheckError> {
    check_manifests_cancellable(spec, target, config, &())
}

/// As [`check_manifests`], but checked against a cooperative cancellation
/// probe between paths (spec.md §5).
pub fn check_manifests_cancellable(
    spec: &Manifest,
    target: &Manifest,
    config: &CheckConfig,
    cancel: &dyn CancellationToken,
) -> Result<CheckResult, CheckError> {
    config.validate_keywords()?;
    diff(spec, target, &config.keywords, cancel)
}

fn values_equal(keyword: &str, expected: &[u8], observed: &[u8]) -> bool {
    if keyword.ends_with("digest") {
        expected.eq_ignore_ascii_case(observed)
    } else if keyword == "mode" {
        match (parse_octal(expected), parse_octal(observed)) {
            (Some(a), Some(b)) => a == b,
            _ => expected == observed,
        }
    } else if keyword == "time" {
        match (parse_time(expected), parse_time(observed)) {
            (Some(a), Some(b)) => a == b,
            _ => expected == observed,
        }
    } else {
        expected == observed
    }
}

fn parse_octal(raw: &[u8]) -> Option<u32> {
    u32::from_str_radix(std::str::from_utf8(raw).ok()?.trim(), 8).ok()
}

fn parse_time(raw: &[u8]) -> Option<(u64, u64)> {
    let s = std::str::from_utf8(raw).ok()?;
    let (secs, nanos) = s.split_once('.')?;
    Some((secs.parse().ok()?, nanos.parse().ok()?))
}

fn diff(
    spec: &Manifest,
    target: &Manifest,
    requested: &[String],
    cancel: &dyn CancellationToken,
) -> Result<CheckResult, CheckError> {
    let spec_map: BTreeMap<PathBuf, mtree_core::KeywordSet> =
        spec.resolve().into_iter().map(|e| (e.path, e.keywords)).collect();
    let target_map: BTreeMap<PathBuf, mtree_core::KeywordSet> =
        target.resolve().into_iter().map(|e| (e.path, e.keywords)).collect();

    let mut discrepancies = Vec::new();
    for either in spec_map
        .into_iter()
        .merge_join_by(target_map, |a, b| a.0.cmp(&b.0))
    {
        if cancel.is_cancelled() {
            return Err(mtree_core::Cancelled.into());
        }
        match either {
            EitherOrBoth::Both((path, spec_kw), (_, target_kw)) => {
                for kw in requested {
                    let Some(expected) = spec_kw.get(kw) else {
                        continue;
                    };
                    match target_kw.get(kw) {
                        Some(observed) if values_equal(kw, expected, observed) => {}
                        Some(observed) => discrepancies.push(Discrepancy::Failure {
                            path: path.clone(),
                            keyword: kw.clone(),
                            expected: expected.to_vec(),
                            observed: observed.to_vec(),
                        }),
                        None => discrepancies.push(Discrepancy::Failure {
                            path: path.clone(),
                            keyword: kw.clone(),
                            expected: expected.to_vec(),
                            observed: MISSING_MARKER.to_vec(),
                        }),
                    }
                }
            }
            EitherOrBoth::Left((path, _)) => discrepancies.push(Discrepancy::Missing { path }),
            EitherOrBoth::Right((path, _)) => discrepancies.push(Discrepancy::Extra { path }),
        }
    }
    tracing::debug!(target: "mtree_check::diff", count = discrepancies.len(), "check complete");
    Ok(CheckResult { discrepancies })
}
