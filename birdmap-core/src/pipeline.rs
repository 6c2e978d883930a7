use chrono::{DateTime, Utc};

use crate::{
    config::Config,
    error::PipelineError,
    publish::{Published, Publisher},
    render::{MapRenderer, distinct_species},
    source::ObservationSource,
};

/// Summary of one successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub observations: usize,
    pub species: usize,
    pub published: Published,
}

/// Fetch, render and publish once.
///
/// Nothing is written unless the fetch succeeded and the page is fully
/// rendered, so a failed run leaves the previous `latest.html` in place.
pub async fn run<S>(
    source: &S,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Result<RunReport, PipelineError>
where
    S: ObservationSource + ?Sized,
{
    let query = config.notable_query()?;

    log::info!(
        "Fetching notable observations within {} km of ({:.4}, {:.4}) over the last {} day(s)",
        query.radius_km,
        query.center.lat,
        query.center.lon,
        query.back_days,
    );

    let observations = source.fetch_notable(&query).await?;
    let species = distinct_species(&observations).len();

    if observations.is_empty() {
        log::info!("No notable observations in the selected window");
    } else {
        log::info!("Fetched {} notable observations of {species} species", observations.len());
    }

    let html = MapRenderer::new(&config.render).render(&query, &observations, generated_at);
    let published = Publisher::new(&config.publish).publish(&html, generated_at, query.radius_km)?;

    Ok(RunReport { observations: observations.len(), species, published })
}
