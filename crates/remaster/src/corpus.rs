//! Batch content-preservation evaluation over a directory of MIDI files.
//!
//! Every file is remapped in memory for each requested style and scored
//! against its own input. A file that cannot be read or parsed becomes one
//! error row per style instead of stopping the run.

use anyhow::{bail, Result};
use midi_remap::{evaluate_pair, Catalogue, EvaluationResult, Palette, Stream};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CSV_HEADER: &str =
    "midi_file,style,melody_similarity,onset_precision,onset_recall,onset_f_measure,error";

/// One (file, style) run.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusRow {
    pub midi_file: String,
    pub style: String,
    pub result: Option<EvaluationResult>,
    pub error: Option<String>,
}

/// Mean scores for one style over its successful runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleSummary {
    pub style: String,
    pub runs: usize,
    pub melody_similarity: Option<f64>,
    pub onset_f_measure: Option<f64>,
}

/// `.mid` and `.midi` files under `dir`, sorted by path.
pub fn discover_midi_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi")
                })
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Evaluate every file under `dir` against every style in `styles`.
///
/// Unknown styles fail up front, before any file is read.
pub fn run(
    dir: &Path,
    styles: &[String],
    catalogue: &Catalogue,
    tolerance: f64,
) -> Result<Vec<CorpusRow>> {
    if !dir.is_dir() {
        bail!("Corpus directory not found: {}", dir.display());
    }

    let mut palettes: Vec<(&str, &Palette)> = Vec::with_capacity(styles.len());
    for style in styles {
        palettes.push((style.as_str(), catalogue.palette(style)?));
    }

    let files = discover_midi_files(dir);
    if files.is_empty() {
        bail!("No .mid/.midi files in {}", dir.display());
    }

    tracing::info!(
        files = files.len(),
        styles = palettes.len(),
        tolerance_ms = tolerance * 1000.0,
        "evaluating corpus"
    );

    let mut rows = Vec::with_capacity(files.len() * palettes.len());
    for path in &files {
        let midi_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let stream = match load(path) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
                for (style, _) in &palettes {
                    rows.push(CorpusRow {
                        midi_file: midi_file.clone(),
                        style: style.to_string(),
                        result: None,
                        error: Some(e.clone()),
                    });
                }
                continue;
            }
        };

        for (style, palette) in &palettes {
            let remapped = midi_remap::remap(&stream, palette);
            let result = evaluate_pair(&stream, &remapped, tolerance);
            tracing::debug!(
                file = %midi_file,
                style,
                melody_similarity = result.melody_similarity,
                onset_f_measure = result.onset_alignment.f_measure,
                "evaluated"
            );
            rows.push(CorpusRow {
                midi_file: midi_file.clone(),
                style: style.to_string(),
                result: Some(result),
                error: None,
            });
        }
    }

    Ok(rows)
}

fn load(path: &Path) -> std::result::Result<Stream, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    midi_remap::codec::parse(&bytes).map_err(|e| e.to_string())
}

/// Per-style means over rows without an error, in `styles` order.
pub fn summarize(rows: &[CorpusRow], styles: &[String]) -> Vec<StyleSummary> {
    styles
        .iter()
        .map(|style| {
            let results: Vec<&EvaluationResult> = rows
                .iter()
                .filter(|r| &r.style == style)
                .filter_map(|r| r.result.as_ref())
                .collect();
            let mean = |f: fn(&EvaluationResult) -> f64| {
                (!results.is_empty())
                    .then(|| results.iter().map(|r| f(r)).sum::<f64>() / results.len() as f64)
            };
            StyleSummary {
                style: style.clone(),
                runs: results.len(),
                melody_similarity: mean(|r| r.melody_similarity),
                onset_f_measure: mean(|r| r.onset_alignment.f_measure),
            }
        })
        .collect()
}

pub fn write_csv(rows: &[CorpusRow], out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for row in rows {
        let metrics = match &row.result {
            Some(r) => format!(
                "{:.4},{:.4},{:.4},{:.4}",
                r.melody_similarity,
                r.onset_alignment.precision,
                r.onset_alignment.recall,
                r.onset_alignment.f_measure
            ),
            None => ",,,".to_string(),
        };
        writeln!(
            out,
            "{},{},{},{}",
            csv_field(&row.midi_file),
            csv_field(&row.style),
            metrics,
            csv_field(row.error.as_deref().unwrap_or(""))
        )?;
    }
    Ok(())
}

pub fn print_summary(summaries: &[StyleSummary], out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{:<8}  {:>4}  {:>17}  {:>14}", "style", "runs", "melody sim (mean)", "onset F (mean)")?;
    for s in summaries {
        let cell = |v: Option<f64>| v.map_or_else(|| "no data".to_string(), |v| format!("{:.4}", v));
        writeln!(
            out,
            "{:<8}  {:>4}  {:>17}  {:>14}",
            s.style,
            s.runs,
            cell(s.melody_similarity),
            cell(s.onset_f_measure)
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::write_fixture;

    fn styles(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_fixture(dir.path(), "b.mid");
        write_fixture(&dir.path().join("nested"), "a.MIDI");
        std::fs::write(dir.path().join("notes.txt"), "not midi").unwrap();

        let files = discover_midi_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.mid", "a.MIDI"]);
    }

    #[test]
    fn test_run_scores_every_style() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "song.mid");

        let ids = styles(&["snes", "wii"]);
        let rows = run(dir.path(), &ids, &Catalogue::builtin(), 0.05).unwrap();

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.error.is_none());
            assert_eq!(row.result.unwrap().onset_alignment.f_measure, 1.0);
        }
    }

    #[test]
    fn test_parse_failure_becomes_error_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "good.mid");
        std::fs::write(dir.path().join("bad.mid"), b"definitely not midi").unwrap();

        let ids = styles(&["snes", "gba"]);
        let rows = run(dir.path(), &ids, &Catalogue::builtin(), 0.05).unwrap();

        assert_eq!(rows.len(), 4);
        let bad: Vec<_> = rows.iter().filter(|r| r.midi_file == "bad.mid").collect();
        assert_eq!(bad.len(), 2);
        assert!(bad.iter().all(|r| r.result.is_none() && r.error.is_some()));

        let summary = summarize(&rows, &ids);
        assert_eq!(summary[0].runs, 1);
        assert_eq!(summary[0].onset_f_measure, Some(1.0));
    }

    #[test]
    fn test_unknown_style_fails_before_work() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "song.mid");

        let err = run(dir.path(), &styles(&["genesis"]), &Catalogue::builtin(), 0.05).unwrap_err();
        assert!(err.to_string().contains("genesis"));
    }

    #[test]
    fn test_empty_corpus_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), &styles(&["snes"]), &Catalogue::builtin(), 0.05).is_err());
    }

    #[test]
    fn test_summary_without_data() {
        let summary = summarize(&[], &styles(&["nds"]));
        assert_eq!(
            summary,
            vec![StyleSummary {
                style: "nds".to_string(),
                runs: 0,
                melody_similarity: None,
                onset_f_measure: None,
            }]
        );

        let mut out = Vec::new();
        print_summary(&summary, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("no data"));
    }

    #[test]
    fn test_csv_layout() {
        let rows = vec![
            CorpusRow {
                midi_file: "a,b.mid".to_string(),
                style: "snes".to_string(),
                result: None,
                error: Some("MIDI parse error: \"bad\"".to_string()),
            },
        ];
        let mut out = Vec::new();
        write_csv(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "\"a,b.mid\",snes,,,,,\"MIDI parse error: \"\"bad\"\"\""
        );
    }
}
