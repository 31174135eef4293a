use std::sync::Arc;

use tracing::debug;

use crate::cache::{FetchFuture, FetchPreviousFn};
use crate::error::Result;
use crate::rest::HoldbookHttpClient;
use crate::types::{ApiResponse, PreviousQuery, PreviousRecord};

impl HoldbookHttpClient {
    /// GET {endpoint}?recordId=&marketId=&selectionId=&referenceTime=&... -
    /// The snapshot preceding `query.record_id`.
    ///
    /// `Ok(None)` means the backend confirmed there is no earlier record.
    /// A non-zero envelope code is returned as [`crate::HoldbookError::Api`].
    pub async fn get_previous_record(
        &self,
        endpoint: &str,
        query: &PreviousQuery,
    ) -> Result<Option<PreviousRecord>> {
        debug!(record_id = query.record_id, endpoint, "requesting previous record");
        let resp: ApiResponse<PreviousRecord> = self.get(endpoint, &query.to_pairs()).await?;
        resp.into_result()
    }

    /// Wrap [`get_previous_record`](Self::get_previous_record) as the fetch
    /// function consumed by [`crate::cache::RecordCache`].
    pub fn previous_fetcher(&self, endpoint: impl Into<String>) -> Arc<FetchPreviousFn> {
        let client = self.clone();
        let endpoint: Arc<str> = endpoint.into().into();
        Arc::new(move |query: PreviousQuery| -> FetchFuture {
            let client = client.clone();
            let endpoint = Arc::clone(&endpoint);
            Box::pin(async move { client.get_previous_record(&endpoint, &query).await })
        })
    }
}
