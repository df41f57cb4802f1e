//! The `weigh` command: descriptor in, weight and log files out.

use std::path::Path;

use anyhow::Context;
use weights::{ConfigSource, PipelineOutput, WeightingPipeline};

use crate::inputs::PathDescriptor;
use crate::outputs;

pub fn run(path_file: &Path, param_file: &Path) -> anyhow::Result<PipelineOutput> {
    let descriptor = PathDescriptor::load(path_file)?;
    let params = ConfigSource::FilePath(param_file.to_path_buf())
        .resolve()
        .with_context(|| format!("Invalid parameter file {}", param_file.display()))?;
    let plot = params.plot();

    descriptor.check_inputs()?;
    let events = descriptor.load_events()?;
    tracing::info!(
        events = events.len(),
        path_file = %path_file.display(),
        "Inputs loaded"
    );

    let pipeline = WeightingPipeline::new(params)?;
    let output = pipeline.run(&events)?;

    let written = outputs::write_weights(&descriptor, &output)?;
    outputs::write_logs(&descriptor.logfile, &output, plot)?;

    tracing::info!(
        mode = %output.mode,
        files = written,
        weighted_total = output.combined.weighted_total(),
        "Weighting finished"
    );
    Ok(output)
}
