use thiserror::Error;

/// Why a single candidate endpoint was rejected. Recovered by moving on to the
/// next candidate; only the last one is ever reported.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: request error: {message}")]
    Request { url: String, message: String },

    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url}: body is not JSON: {message}")]
    Body { url: String, message: String },

    #[error("{url}: JSON body is not an object")]
    NotCollection { url: String },

    #[error("{url}: no non-empty features list")]
    NoFeatures { url: String },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "unable to fetch the French regions: all {attempts} sources failed (geo.api.gouv.fr and fallbacks). Last error: {}",
        describe_last(.last)
    )]
    Exhausted {
        attempts: usize,
        last: Option<FetchError>,
    },
}

fn describe_last(last: &Option<FetchError>) -> String {
    match last {
        Some(err) => err.to_string(),
        None => "no source configured".to_string(),
    }
}
