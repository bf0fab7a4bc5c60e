//! CLI command implementations

use anyhow::{bail, Context, Result};
use midi_remap::{codec, gm, Catalogue, Palette, Stream};
use remapconf::{ConfigSources, RemapConfig};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Builtin styles plus any `[styles.<id>]` tables from configuration.
pub fn build_catalogue(config: &RemapConfig) -> Result<Catalogue> {
    let mut catalogue = Catalogue::builtin();
    for (id, style) in &config.styles {
        let palette = Palette::new(
            style.leads.clone(),
            style.pads.clone(),
            style.basses.clone(),
            style.percussion,
        )
        .with_context(|| format!("Invalid palette for style '{}'", id))?;
        catalogue.insert(id, palette);
    }
    Ok(catalogue)
}

/// Read and parse a MIDI file.
pub fn read_stream(path: &Path) -> Result<Stream> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    codec::parse(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Reject tolerances the matcher cannot use.
pub fn validate_tolerance(tolerance: f64) -> Result<f64> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        bail!(
            "Invalid onset tolerance: {}\n\nTolerance is in seconds and must be positive, e.g. 0.05",
            tolerance
        );
    }
    Ok(tolerance)
}

fn labelled(programs: &[u8]) -> String {
    programs
        .iter()
        .map(|&p| format!("{} {}", p, gm::program_name(p)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// List every style and its buckets
pub fn styles(catalogue: &Catalogue, out: &mut impl Write) -> Result<()> {
    for (id, palette) in catalogue.iter() {
        writeln!(out, "{}", id)?;
        writeln!(out, "  leads:      {}", labelled(palette.leads()))?;
        writeln!(out, "  pads:       {}", labelled(palette.pads()))?;
        writeln!(out, "  basses:     {}", labelled(palette.basses()))?;
        writeln!(out, "  percussion: {}", labelled(&[palette.percussion()]))?;
    }
    Ok(())
}

/// Print the role and program chosen for each sounding channel
pub fn classify(input: &Path, palette: &Palette, json: bool, out: &mut impl Write) -> Result<()> {
    let stream = read_stream(input)?;
    let report = midi_remap::classify_stream(&stream, palette);
    tracing::info!(
        path = %input.display(),
        channels = report.len(),
        "classified input"
    );

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    if report.is_empty() {
        writeln!(out, "No sounding channels in {}", input.display())?;
        return Ok(());
    }

    writeln!(out, "{:>7}  {:<10}  {:>7}  instrument", "channel", "role", "program")?;
    for (channel, c) in &report {
        writeln!(
            out,
            "{:>7}  {:<10}  {:>7}  {}",
            channel,
            c.role.as_str(),
            c.program,
            c.label
        )?;
    }
    Ok(())
}

/// Classify, remap, and write a new MIDI file
pub fn remap(
    input: &Path,
    output: &Path,
    style: &str,
    palette: &Palette,
    out: &mut impl Write,
) -> Result<()> {
    let stream = read_stream(input)?;
    tracing::info!(
        step = "parse",
        path = %input.display(),
        tracks = stream.tracks().len(),
        ticks_per_beat = stream.ticks_per_beat(),
        "parsed input"
    );

    let assignments = midi_remap::channel_assignments(&stream, palette);
    tracing::info!(step = "classify", channels = assignments.len(), "classified channels");

    let remapped = midi_remap::remap(&stream, palette);
    tracing::info!(step = "remap", style, "remapped stream");

    let bytes = codec::serialize(&remapped)
        .with_context(|| format!("Failed to encode {}", output.display()))?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(
        step = "write",
        path = %output.display(),
        bytes = bytes.len(),
        "wrote output"
    );

    for (channel, program) in &assignments {
        writeln!(
            out,
            "channel {:>2} -> {:>3} {}",
            channel,
            program,
            gm::program_name(*program)
        )?;
    }
    writeln!(out, "Wrote {} ({} style)", output.display(), style)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct EvaluationReport<'a> {
    reference: String,
    candidate: String,
    tolerance_seconds: f64,
    #[serde(flatten)]
    result: &'a midi_remap::EvaluationResult,
}

/// Print content-preservation metrics for a pair of files
pub fn evaluate(
    reference: &Path,
    candidate: &Path,
    tolerance: f64,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let reference_stream = read_stream(reference)?;
    let candidate_stream = read_stream(candidate)?;
    let result = midi_remap::evaluate_pair(&reference_stream, &candidate_stream, tolerance);
    tracing::info!(
        melody_similarity = result.melody_similarity,
        onset_f_measure = result.onset_alignment.f_measure,
        "evaluated pair"
    );

    if json {
        let report = EvaluationReport {
            reference: reference.display().to_string(),
            candidate: candidate.display().to_string(),
            tolerance_seconds: tolerance,
            result: &result,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(out, "melody similarity: {:.4}", result.melody_similarity)?;
    writeln!(
        out,
        "onset alignment ({} ms): precision {:.4}  recall {:.4}  F {:.4}",
        (tolerance * 1000.0).round(),
        result.onset_alignment.precision,
        result.onset_alignment.recall,
        result.onset_alignment.f_measure
    )?;
    Ok(())
}

/// Print the effective configuration and where it came from
pub fn config(config: &RemapConfig, sources: &ConfigSources, out: &mut impl Write) -> Result<()> {
    write!(out, "{}", config.to_toml())?;

    writeln!(out)?;
    if sources.files.is_empty() {
        writeln!(out, "# No config files loaded (using defaults)")?;
    } else {
        writeln!(out, "# Loaded from:")?;
        for file in &sources.files {
            writeln!(out, "#   {}", file.display())?;
        }
    }
    if !sources.env_overrides.is_empty() {
        writeln!(out, "# Environment overrides: {}", sources.env_overrides.join(", "))?;
    }
    Ok(())
}
