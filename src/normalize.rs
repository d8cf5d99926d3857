//! Feed normalization: raw NVD-style JSON feeds → compact normalized files.
//!
//! Each raw feed file holds a `CVE_Items` array. Every item is projected onto
//! a fixed set of six fields ([`NormalizedRecord`]) with sentinel fallbacks,
//! and the result is written to `<output_dir>/<prefix><file name>`.
//!
//! A file that cannot be read or is structurally invalid fails on its own;
//! the run continues and the failure is listed in [`NormalizeReport::failed`].

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::FeedsConfig;
use crate::models::{
    IdentifierSets, ImpactScore, NormalizedFile, NormalizedRecord, NO_DESCRIPTION, UNKNOWN,
};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};

/// A feed file that could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a normalization run over a whole input directory.
#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub files_written: Vec<PathBuf>,
    pub records_written: usize,
    pub failed: Vec<FailedFile>,
    pub ids: IdentifierSets,
}

/// Records extracted from one feed file.
#[derive(Debug)]
pub struct FileOutcome {
    pub records: usize,
    pub ids: IdentifierSets,
}

pub fn normalize_feeds(
    config: &FeedsConfig,
    progress: &dyn ProgressReporter,
) -> Result<NormalizeReport> {
    let inputs = discover_feed_files(config)?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    let mut report = NormalizeReport::default();
    let total = inputs.len() as u64;

    for (i, input) in inputs.iter().enumerate() {
        let output = output_path_for(config, input);
        let recent = is_recent_batch(input, &config.recent_marker);

        match normalize_file(input, &output, recent) {
            Ok(outcome) => {
                tracing::info!(
                    input = %input.display(),
                    output = %output.display(),
                    records = outcome.records,
                    recent,
                    "normalized feed file"
                );
                report.records_written += outcome.records;
                report.ids.extend(outcome.ids);
                report.files_written.push(output);
            }
            Err(e) => {
                tracing::warn!(input = %input.display(), error = %format!("{:#}", e), "skipping feed file");
                report.failed.push(FailedFile {
                    path: input.clone(),
                    error: format!("{:#}", e),
                });
            }
        }

        progress.report(ProgressEvent {
            stage: Stage::Normalizing,
            n: i as u64 + 1,
            total,
        });
    }

    Ok(report)
}

/// Feed files directly inside `input_dir` matching the include globs,
/// in sorted order.
pub fn discover_feed_files(config: &FeedsConfig) -> Result<Vec<PathBuf>> {
    let root = &config.input_dir;
    if !root.is_dir() {
        bail!("Feed input directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if include_set.is_match(name.as_ref()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Output location for a feed file: the configured prefix plus its base name.
pub fn output_path_for(config: &FeedsConfig, input: &Path) -> PathBuf {
    let base = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    config
        .output_dir
        .join(format!("{}{}", config.output_prefix, base))
}

/// Whether a feed file belongs to the most recent batch, judged by its name.
pub fn is_recent_batch(input: &Path, marker: &str) -> bool {
    input
        .file_name()
        .map(|n| n.to_string_lossy().contains(marker))
        .unwrap_or(false)
}

/// Normalize a single feed file, overwriting `output`.
pub fn normalize_file(input: &Path, output: &Path, recent: bool) -> Result<FileOutcome> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open feed file: {}", input.display()))?;
    let data: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Feed file is not valid JSON: {}", input.display()))?;

    let items = feed_items(&data)
        .with_context(|| format!("Feed file has an invalid structure: {}", input.display()))?;

    let mut ids = IdentifierSets::new();
    let mut cves = Vec::with_capacity(items.len());
    for item in items {
        let record = extract_record(item);
        if record.cve_id != UNKNOWN {
            ids.record(&record.cve_id, recent);
        }
        cves.push(record);
    }

    let records = cves.len();
    write_normalized(output, &NormalizedFile { cves })?;

    Ok(FileOutcome { records, ids })
}

fn feed_items(data: &Value) -> Result<&[Value]> {
    let obj = match data.as_object() {
        Some(obj) => obj,
        None => bail!("top level is not a JSON object"),
    };
    match obj.get("CVE_Items") {
        None => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => bail!("CVE_Items is not an array"),
    }
}

fn write_normalized(output: &Path, file: &NormalizedFile) -> Result<()> {
    let out = File::create(output)
        .with_context(|| format!("Failed to create normalized file: {}", output.display()))?;
    let mut writer = BufWriter::new(out);
    serde_json::to_writer_pretty(&mut writer, file)?;
    writer.flush()?;
    Ok(())
}

/// Project one raw feed item onto the normalized field set.
///
/// Never fails: a missing or mistyped field at any depth falls back to its
/// sentinel. Problem-type entries without a description are skipped.
pub fn extract_record(item: &Value) -> NormalizedRecord {
    let cve_id = str_at(item, "/cve/CVE_data_meta/ID").unwrap_or(UNKNOWN);
    let assigner = str_at(item, "/cve/CVE_data_meta/ASSIGNER").unwrap_or(UNKNOWN);
    let description = str_at(item, "/cve/description/description_data/0/value")
        .unwrap_or(NO_DESCRIPTION);
    let published_date = str_at(item, "/publishedDate").unwrap_or(UNKNOWN);

    let impact_score = match item.pointer("/impact/baseMetricV3/cvssV3/baseScore") {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(ImpactScore::Score)
            .unwrap_or_else(ImpactScore::not_available),
        Some(Value::String(s)) => ImpactScore::Label(s.clone()),
        _ => ImpactScore::not_available(),
    };

    let problemtype_descriptions = item
        .pointer("/cve/problemtype/problemtype_data")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(problem_type_value).collect())
        .unwrap_or_default();

    NormalizedRecord {
        cve_id: cve_id.to_string(),
        description: description.to_string(),
        impact_score,
        published_date: published_date.to_string(),
        assigner: assigner.to_string(),
        problemtype_descriptions,
    }
}

fn problem_type_value(entry: &Value) -> Option<String> {
    let first = entry.get("description")?.as_array()?.first()?;
    Some(
        first
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN)
            .to_string(),
    )
}

fn str_at<'a>(item: &'a Value, pointer: &str) -> Option<&'a str> {
    item.pointer(pointer).and_then(Value::as_str)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NOT_AVAILABLE;
    use crate::progress::NoProgress;
    use serde_json::json;
    use tempfile::TempDir;

    fn full_item() -> Value {
        json!({
            "cve": {
                "CVE_data_meta": { "ID": "CVE-2024-0001", "ASSIGNER": "vendor@example.com" },
                "description": { "description_data": [{ "lang": "en", "value": "Example flaw" }] },
                "problemtype": { "problemtype_data": [
                    { "description": [{ "lang": "en", "value": "CWE-79" }] }
                ]}
            },
            "impact": { "baseMetricV3": { "cvssV3": { "baseScore": 7.5 } } },
            "publishedDate": "2024-01-01"
        })
    }

    fn feeds_config(tmp: &TempDir) -> FeedsConfig {
        FeedsConfig {
            input_dir: tmp.path().join("raw"),
            output_dir: tmp.path().join("filtered"),
            ..FeedsConfig::default()
        }
    }

    #[test]
    fn extracts_all_fields() {
        let record = extract_record(&full_item());
        assert_eq!(record.cve_id, "CVE-2024-0001");
        assert_eq!(record.description, "Example flaw");
        assert_eq!(record.impact_score, ImpactScore::Score(7.5));
        assert_eq!(record.published_date, "2024-01-01");
        assert_eq!(record.assigner, "vendor@example.com");
        assert_eq!(record.problemtype_descriptions, vec!["CWE-79".to_string()]);
    }

    #[test]
    fn empty_item_gets_sentinels() {
        let record = extract_record(&json!({}));
        assert_eq!(record.cve_id, UNKNOWN);
        assert_eq!(record.description, NO_DESCRIPTION);
        assert_eq!(record.impact_score.to_string(), NOT_AVAILABLE);
        assert_eq!(record.published_date, UNKNOWN);
        assert_eq!(record.assigner, UNKNOWN);
        assert!(record.problemtype_descriptions.is_empty());
    }

    #[test]
    fn mistyped_intermediates_fall_back() {
        let record = extract_record(&json!({
            "cve": { "CVE_data_meta": "oops", "description": { "description_data": [] } },
            "impact": [1, 2, 3],
            "publishedDate": 20240101
        }));
        assert_eq!(record.cve_id, UNKNOWN);
        assert_eq!(record.description, NO_DESCRIPTION);
        assert_eq!(record.impact_score, ImpactScore::not_available());
        assert_eq!(record.published_date, UNKNOWN);

        let not_an_object = extract_record(&json!("just a string"));
        assert_eq!(not_an_object.cve_id, UNKNOWN);
    }

    #[test]
    fn problem_types_skip_entries_without_description() {
        let record = extract_record(&json!({
            "cve": { "problemtype": { "problemtype_data": [
                { "description": [] },
                { "description": [{ "value": "CWE-20" }, { "value": "CWE-ignored" }] },
                {},
                { "description": [{ "lang": "en" }] }
            ]}}
        }));
        assert_eq!(
            record.problemtype_descriptions,
            vec!["CWE-20".to_string(), UNKNOWN.to_string()]
        );
    }

    #[test]
    fn recent_batch_uses_file_name() {
        assert!(is_recent_batch(Path::new("/feeds/nvdcve-1.1-2024.json"), "2024"));
        assert!(!is_recent_batch(Path::new("/2024/nvdcve-1.1-2023.json"), "2024"));
    }

    #[test]
    fn normalizes_directory_and_tracks_ids() {
        let tmp = TempDir::new().unwrap();
        let config = feeds_config(&tmp);
        std::fs::create_dir_all(&config.input_dir).unwrap();

        let mut older = full_item();
        older["cve"]["CVE_data_meta"]["ID"] = json!("CVE-2023-1234");
        std::fs::write(
            config.input_dir.join("nvdcve-2023.json"),
            json!({ "CVE_Items": [older, {}] }).to_string(),
        )
        .unwrap();
        std::fs::write(
            config.input_dir.join("nvdcve-2024.json"),
            json!({ "CVE_Items": [full_item()] }).to_string(),
        )
        .unwrap();
        std::fs::write(config.input_dir.join("notes.txt"), "ignored").unwrap();

        let report = normalize_feeds(&config, &NoProgress).unwrap();
        assert!(report.failed.is_empty());
        assert_eq!(report.files_written.len(), 2);
        assert_eq!(report.records_written, 3);
        assert_eq!(report.ids.all().len(), 2);
        assert_eq!(report.ids.recent().len(), 1);
        assert!(report.ids.recent().contains("CVE-2024-0001"));
        assert!(report.ids.recent().is_subset(report.ids.all()));
        assert_eq!(report.ids.representative(), Some("CVE-2024-0001"));

        let written = config.output_dir.join("compressed-nvdcve-2024.json");
        let parsed: NormalizedFile =
            serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(parsed.cves.len(), 1);
        assert_eq!(parsed.cves[0].impact_score, ImpactScore::Score(7.5));
    }

    #[test]
    fn bad_file_does_not_abort_the_run() {
        let tmp = TempDir::new().unwrap();
        let config = feeds_config(&tmp);
        std::fs::create_dir_all(&config.input_dir).unwrap();
        std::fs::write(config.input_dir.join("a-broken.json"), "{ not json").unwrap();
        std::fs::write(config.input_dir.join("b-list.json"), "[1, 2]").unwrap();
        std::fs::write(
            config.input_dir.join("c-good.json"),
            json!({ "CVE_Items": [full_item()] }).to_string(),
        )
        .unwrap();

        let report = normalize_feeds(&config, &NoProgress).unwrap();
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.files_written.len(), 1);
        assert_eq!(report.records_written, 1);
        assert!(report.failed[0].path.ends_with("a-broken.json"));
    }

    #[test]
    fn rerun_overwrites_output() {
        let tmp = TempDir::new().unwrap();
        let config = feeds_config(&tmp);
        std::fs::create_dir_all(&config.input_dir).unwrap();
        let input = config.input_dir.join("feed.json");
        std::fs::write(&input, json!({ "CVE_Items": [full_item(), full_item()] }).to_string())
            .unwrap();
        normalize_feeds(&config, &NoProgress).unwrap();

        std::fs::write(&input, json!({ "CVE_Items": [full_item()] }).to_string()).unwrap();
        let report = normalize_feeds(&config, &NoProgress).unwrap();
        assert_eq!(report.records_written, 1);

        let written = std::fs::read_to_string(config.output_dir.join("compressed-feed.json"))
            .unwrap();
        let parsed: NormalizedFile = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.cves.len(), 1);
    }

    #[test]
    fn missing_input_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let config = feeds_config(&tmp);
        assert!(normalize_feeds(&config, &NoProgress).is_err());
    }
}
