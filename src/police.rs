//! Guest lookup and flagging for police operators.
//!
//! Only the newest search may update the results. Starting a search cancels
//! the one in flight; the canceled request's response or error is dropped
//! without being reported.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::transport::{CancelToken, RequestOptions, Transport};
use crate::types::{Guest, GuestId, Pagination, SearchBy};

/// Results requested per page.
pub const PAGE_LIMIT: u32 = 10;

const SEARCH_PATH: &str = "/police/search";
const ALERTS_PATH: &str = "/police/alerts";

/// Input of a police guest search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchForm {
    pub query: String,
    pub search_by: SearchBy,
    /// Why the officer is searching; recorded by the backend for audit.
    pub reason: String,
}

impl SearchForm {
    #[must_use]
    pub fn new(query: impl Into<String>, search_by: SearchBy, reason: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_by,
            reason: reason.into(),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the query or reason is blank.
    pub fn validate(&self) -> Result<(), Error> {
        if self.query.trim().is_empty() || self.reason.trim().is_empty() {
            return Err(Error::Validation(
                "Search term and reason are mandatory.".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    search_by: SearchBy,
    reason: &'a str,
    page: u32,
    limit: u32,
}

#[derive(Deserialize)]
struct SearchPage {
    guests: Vec<Guest>,
    pagination: Pagination,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FlagRequest<'a> {
    guest_id: &'a GuestId,
    reason: &'a str,
}

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub guests: Vec<Guest>,
    pub pagination: Pagination,
    pub loading: bool,
    pub searched: bool,
    pub error: Option<String>,
}

/// How a search call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The response was applied to the results.
    Applied,
    /// A newer search started before this one finished; nothing changed.
    Superseded,
    /// `load_more` had no further page to fetch.
    Exhausted,
}

#[derive(Default)]
struct SearchState {
    results: SearchResults,
    form: Option<SearchForm>,
    generation: u64,
    in_flight: Option<CancelToken>,
}

/// Police guest search with paging; only the newest request updates the results.
pub struct GuestSearch {
    transport: Arc<Transport>,
    state: Mutex<SearchState>,
}

impl GuestSearch {
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(SearchState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current results.
    #[must_use]
    pub fn results(&self) -> SearchResults {
        self.state().results.clone()
    }

    /// Run a new search from page 1, replacing current results.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an incomplete form, otherwise the transport
    /// error of this search. Superseded searches never return an error.
    pub async fn search(&self, form: SearchForm) -> Result<SearchOutcome, Error> {
        form.validate()?;
        self.perform(form, 1, false).await
    }

    /// Fetch the next page and append it.
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn load_more(&self) -> Result<SearchOutcome, Error> {
        let (form, next_page) = {
            let state = self.state();
            let results = &state.results;
            match &state.form {
                Some(form) if results.pagination.has_next_page && !results.loading => {
                    (form.clone(), results.pagination.page + 1)
                }
                _ => return Ok(SearchOutcome::Exhausted),
            }
        };
        self.perform(form, next_page, true).await
    }

    async fn perform(
        &self,
        form: SearchForm,
        page: u32,
        append: bool,
    ) -> Result<SearchOutcome, Error> {
        let (generation, token) = {
            let mut state = self.state();
            if let Some(previous) = state.in_flight.take() {
                previous.cancel();
            }
            state.generation += 1;
            let token = CancelToken::new();
            state.in_flight = Some(token.clone());
            state.form = Some(form.clone());
            state.results.loading = true;
            state.results.searched = true;
            state.results.error = None;
            (state.generation, token)
        };

        let body = serde_json::to_value(SearchRequest {
            query: &form.query,
            search_by: form.search_by,
            reason: &form.reason,
            page,
            limit: PAGE_LIMIT,
        })?;
        let result = self
            .transport
            .request(
                Method::POST,
                SEARCH_PATH,
                Some(body),
                RequestOptions::new().with_cancel(token),
            )
            .await
            .and_then(|response| response.data::<SearchPage>());

        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!(generation, "Discarding superseded search");
            return Ok(SearchOutcome::Superseded);
        }
        state.in_flight = None;
        state.results.loading = false;

        match result {
            Ok(found) => {
                if append {
                    state.results.guests.extend(found.guests);
                } else {
                    state.results.guests = found.guests;
                }
                state.results.pagination = found.pagination;
                Ok(SearchOutcome::Applied)
            }
            Err(Error::Canceled) => Ok(SearchOutcome::Superseded),
            Err(e) => {
                state.results.error =
                    Some(e.server_message().unwrap_or_else(|| "Search failed.".into()));
                if !append {
                    state.results.guests.clear();
                }
                tracing::warn!(error = %e, page, "Guest search failed");
                Err(e)
            }
        }
    }

    /// Raise an alert on a guest; the backend notifies the relevant hotel and
    /// administrators over the realtime channel.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a blank reason, otherwise transport errors.
    pub async fn flag_guest(&self, guest_id: &GuestId, reason: &str) -> Result<(), Error> {
        if reason.trim().is_empty() {
            return Err(Error::Validation("A reason is required to flag a guest.".into()));
        }
        self.transport
            .post(ALERTS_PATH, &FlagRequest { guest_id, reason })
            .await?;
        tracing::info!(guest_id = %guest_id, "Guest flagged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_requires_query_and_reason() {
        assert!(SearchForm::new("  ", SearchBy::Name, "theft").validate().is_err());
        assert!(SearchForm::new("Ravi", SearchBy::Name, "").validate().is_err());
        assert!(SearchForm::new("Ravi", SearchBy::Phone, "theft").validate().is_ok());
    }

    #[test]
    fn search_request_shape() {
        let body = serde_json::to_value(SearchRequest {
            query: "9876",
            search_by: SearchBy::Phone,
            reason: "inquiry",
            page: 2,
            limit: PAGE_LIMIT,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "query": "9876",
                "searchBy": "phone",
                "reason": "inquiry",
                "page": 2,
                "limit": 10
            })
        );
    }
}
