// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Console Report
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use keff_core::{BatchObserver, BatchReport, RunSummary};
use keff_types::config::SimulationConfig;
use std::fmt;

const WIDTH: usize = 79;

fn border() -> String {
    "=".repeat(WIDTH)
}

fn centered(title: &str) -> String {
    format!("{title:^width$}", width = WIDTH)
}

/// Input summary printed before the batch table.
pub struct ParametersBlock<'a> {
    pub config: &'a SimulationConfig,
    pub ranks: usize,
}

impl fmt::Display for ParametersBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (config, ranks) = (self.config, self.ranks);
        let run = &config.run;
        let geo = &config.geometry;
        let mat = &config.material;
        let out = &config.output;
        writeln!(f, "{}", border())?;
        writeln!(f, "{}", centered("INPUT SUMMARY"))?;
        writeln!(f, "{}", border())?;
        writeln!(f, "Number of particles:          {}", run.particles)?;
        writeln!(f, "Number of batches:            {}", run.batches)?;
        writeln!(f, "Number of active batches:     {}", run.active)?;
        writeln!(f, "Number of generations:        {}", run.generations)?;
        writeln!(f, "Boundary conditions:          {}", geo.boundary)?;
        writeln!(f, "Number of nuclides:           {}", mat.nuclides)?;
        writeln!(f, "Tally:                        {}", if out.tally { "on" } else { "off" })?;
        writeln!(f, "Number of bins:               {}", out.bins)?;
        writeln!(f, "RNG seed:                     {}", run.seed)?;
        writeln!(f, "Average neutrons per fission: {:.2}", mat.nu)?;
        writeln!(f, "Fission cross section:        {:.4} cm^-1", mat.xs_fission)?;
        writeln!(f, "Absorption cross section:     {:.4} cm^-1", mat.xs_absorption)?;
        writeln!(f, "Scattering cross section:     {:.4} cm^-1", mat.xs_scatter)?;
        writeln!(
            f,
            "Geometry:                     {} x {} x {} cm",
            geo.cube[0], geo.cube[1], geo.cube[2]
        )?;
        writeln!(
            f,
            "Process grid:                 {} x {} x {} ({ranks} ranks)",
            geo.grid[0], geo.grid[1], geo.grid[2]
        )
    }
}

pub fn batch_header() -> String {
    format!(
        "{}\n{}\n{:<15} {:<15} {:<15}",
        centered("SIMULATION"),
        border(),
        "BATCH",
        "KEFF",
        "MEAN KEFF"
    )
}

pub fn batch_line(report: &BatchReport) -> String {
    let mean = match (report.mean, report.std) {
        (Some(m), Some(s)) => format!("{m:.6} +/- {s:.6}"),
        (Some(m), None) => format!("{m:.6}"),
        _ => String::new(),
    };
    format!("{:<15} {:<15.6} {}", report.batch + 1, report.keff, mean)
        .trim_end()
        .to_string()
}

pub fn summary_line(summary: &RunSummary) -> String {
    format!("Simulation time: {:.6} secs", summary.elapsed_seconds)
}

/// Prints one line per batch as rank 0 reports it.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    printed_header: bool,
}

impl BatchObserver for ConsoleReporter {
    fn on_batch(&mut self, report: &BatchReport) {
        if !self.printed_header {
            println!("{}", batch_header());
            self.printed_header = true;
        }
        println!("{}", batch_line(report));
    }
}
