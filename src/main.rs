mod analysis;
mod conditions;
mod layout;
mod report;

use analysis::run_analysis;
use conditions::apply_flight_conditions;
use layout::build_cascade;
use report::render_summary;
use std::error::Error;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Anchors and attachment points are fixed; the knots are placed by the solver.
    let (mut lines, layout) = build_cascade()?;
    let conditions = apply_flight_conditions(&mut lines, &layout)?;
    let summary = run_analysis(&mut lines, &layout, conditions)?;

    println!("{}", render_summary(&summary));
    println!("{}", lines.get_checksheet()?);

    Ok(())
}
