// Dashboard session: the current inputs of the engine plus the fetch
// lifecycle that keeps its records up to date.
//
// Records are replaced wholesale on every refresh. Each refresh takes a
// ticket from a monotonically increasing generation counter; a payload whose
// ticket has been superseded by a newer refresh is dropped instead of
// applied.
use crate::engine::{self, Capabilities};
use crate::filters::FilterState;
use crate::source::{DataSource, MatrixQuery};
use crate::types::{CountMap, Dashboard, Dimension, FallbackMaps, Record, SortKey, SortSpec};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Generation marker handed out by [`Session::begin_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Result of one refresh: records plus count maps for missing dimensions.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub records: Vec<Record>,
    pub fallback: FallbackMaps,
}

/// Distinct values that populate the selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enumerations {
    pub status_sap: Vec<String>,
    pub tipos: Vec<String>,
    pub meses: Vec<String>,
    pub regions: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    filters: FilterState,
    sort: Option<SortSpec>,
    records: Arc<Vec<Record>>,
    fallback: Arc<FallbackMaps>,
    enumerations: Enumerations,
    /// Query behind the records currently held; `None` before the first load.
    applied_query: Option<MatrixQuery>,
}

#[derive(Debug, Default)]
pub struct Session {
    generation: AtomicU64,
    state: Mutex<State>,
}

async fn fetch_or_empty<T: Default>(
    what: &str,
    fut: impl std::future::Future<Output = crate::error::Result<T>>,
) -> T {
    match fut.await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to fetch {}, using empty result", what);
            T::default()
        }
    }
}

async fn fallback_for(
    source: &dyn DataSource,
    dimension: Dimension,
    caps: Capabilities,
    query: &MatrixQuery,
) -> CountMap {
    if caps.has(dimension) {
        return CountMap::new();
    }
    fetch_or_empty(dimension.key(), source.fallback_counts(dimension, query)).await
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn filters(&self) -> FilterState {
        self.lock().filters.clone()
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.lock().sort
    }

    pub fn records(&self) -> Arc<Vec<Record>> {
        Arc::clone(&self.lock().records)
    }

    pub fn enumerations(&self) -> Enumerations {
        self.lock().enumerations.clone()
    }

    /// Mutate the filters in place.
    pub fn update_filters(&self, f: impl FnOnce(&mut FilterState)) {
        f(&mut self.lock().filters);
    }

    /// Chart bar click. Returns whether `dimension` is filtered afterwards.
    pub fn toggle_filter(&self, dimension: Dimension, label: &str) -> bool {
        self.lock().filters.toggle(dimension, label)
    }

    /// Column header click.
    pub fn set_sort(&self, key: SortKey) -> SortSpec {
        let mut state = self.lock();
        let next = SortSpec::toggle(state.sort, key);
        state.sort = Some(next);
        next
    }

    pub fn clear_filters(&self) {
        self.lock().filters.clear();
    }

    /// Whether the held records were fetched for different upstream
    /// parameters than the current filters ask for.
    pub fn needs_refresh(&self) -> bool {
        let state = self.lock();
        state.applied_query.as_ref() != Some(&state.filters.upstream_query())
    }

    pub fn begin_refresh(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Install `payload` fetched for `query` unless a newer refresh started
    /// in the meantime. Returns whether it was applied.
    pub fn apply(&self, ticket: Ticket, query: MatrixQuery, payload: Payload) -> bool {
        let mut state = self.lock();
        if !self.is_current(ticket) {
            debug!(ticket = ticket.0, "discarding stale payload");
            return false;
        }
        state.records = Arc::new(payload.records);
        state.fallback = Arc::new(payload.fallback);
        state.applied_query = Some(query);
        true
    }

    /// Fetch records for the current upstream parameters, then count maps
    /// for whichever secondary dimensions the records lack. Failed fetches
    /// degrade to empty data. Returns whether the result was applied.
    pub async fn refresh(&self, source: &dyn DataSource) -> bool {
        let ticket = self.begin_refresh();
        let query = self.filters().upstream_query();

        let records = fetch_or_empty("records", source.fetch_records(&query)).await;
        let caps = Capabilities::detect(&records);
        let fallback_query = query.without_chart_filters();
        let (ener, conc, reasons) = tokio::join!(
            fallback_for(source, Dimension::StatusEner, caps, &fallback_query),
            fallback_for(source, Dimension::StatusConc, caps, &fallback_query),
            fallback_for(source, Dimension::Reasons, caps, &fallback_query),
        );

        let count = records.len();
        let payload = Payload {
            records,
            fallback: FallbackMaps { ener, conc, reasons },
        };
        let applied = self.apply(ticket, query, payload);
        if applied {
            info!(records = count, missing = ?caps.missing(), "dashboard data refreshed");
        }
        applied
    }

    /// Load the selector lists concurrently; each failure leaves only its own
    /// list empty.
    pub async fn load_enumerations(&self, source: &dyn DataSource) -> Enumerations {
        let (status_sap, tipos, meses, regions) = tokio::join!(
            fetch_or_empty("SAP statuses", source.status_sap_values()),
            fetch_or_empty("types", source.tipo_values()),
            fetch_or_empty("completion months", source.completion_months()),
            fetch_or_empty("regions", source.regions()),
        );
        let enumerations = Enumerations {
            status_sap,
            tipos,
            meses,
            regions,
        };
        self.lock().enumerations = enumerations.clone();
        enumerations
    }

    /// Recompute the dashboard from the current snapshot of inputs.
    pub fn dashboard(&self) -> Dashboard {
        let (records, fallback, filters, sort) = {
            let state = self.lock();
            (
                Arc::clone(&state.records),
                Arc::clone(&state.fallback),
                state.filters.clone(),
                state.sort,
            )
        };
        engine::compute(&records, &fallback, &filters, sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReportError, Result};
    use crate::types::Valor;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn rec(pep: &str, seccional: &str, valor: f64) -> Record {
        Record {
            pep: pep.into(),
            seccional: seccional.into(),
            valor: Valor::Number(valor),
            ..Default::default()
        }
    }

    /// Records without secondary statuses; count maps succeed for ENER only.
    struct LegacySource;

    #[async_trait]
    impl DataSource for LegacySource {
        async fn fetch_records(&self, _query: &MatrixQuery) -> Result<Vec<Record>> {
            Ok(vec![rec("A", "Sul", 10.0), rec("B", "Norte", 20.0)])
        }

        async fn status_sap_values(&self) -> Result<Vec<String>> {
            Ok(vec!["Concluído".into()])
        }

        async fn tipo_values(&self) -> Result<Vec<String>> {
            Err(ReportError::Unavailable("tipos".into()))
        }

        async fn completion_months(&self) -> Result<Vec<String>> {
            Ok(vec!["2024-01".into()])
        }

        async fn regions(&self) -> Result<Vec<String>> {
            Ok(vec!["Norte".into(), "Sul".into()])
        }

        async fn fallback_counts(&self, dimension: Dimension, _query: &MatrixQuery) -> Result<CountMap> {
            match dimension {
                Dimension::StatusEner => Ok(BTreeMap::from([(
                    "Energizado".to_string(),
                    BTreeMap::from([("Sul".to_string(), 2u64)]),
                )])),
                _ => Err(ReportError::Unavailable("counts".into())),
            }
        }
    }

    #[test]
    fn stale_ticket_is_not_applied() {
        let session = Session::new();
        let first = session.begin_refresh();
        let second = session.begin_refresh();
        assert!(first < second);

        let newer = Payload {
            records: vec![rec("NEW", "Sul", 1.0)],
            ..Default::default()
        };
        let older = Payload {
            records: vec![rec("OLD", "Sul", 1.0)],
            ..Default::default()
        };
        assert!(session.apply(second, MatrixQuery::default(), newer));
        assert!(!session.apply(first, MatrixQuery::default(), older));
        assert_eq!(session.records()[0].pep, "NEW");
    }

    #[test]
    fn upstream_changes_require_refresh() {
        let session = Session::new();
        assert!(session.needs_refresh());
        let t = session.begin_refresh();
        session.apply(t, session.filters().upstream_query(), Payload::default());
        assert!(!session.needs_refresh());

        session.update_filters(|f| f.set_region(Some("Sul".into())));
        session.update_filters(|f| f.pep_search = "x".into());
        assert!(!session.needs_refresh());

        session.toggle_filter(Dimension::StatusConc, "Aberta");
        assert!(session.needs_refresh());
    }

    #[test]
    fn sort_follows_header_clicks() {
        let session = Session::new();
        assert_eq!(session.sort(), None);
        session.set_sort(SortKey::Rs);
        let s = session.set_sort(SortKey::Rs);
        assert_eq!(s.direction, crate::types::SortDirection::Desc);
        assert_eq!(session.sort(), Some(s));
    }

    #[tokio::test]
    async fn refresh_degrades_failed_fallbacks_to_empty() {
        let session = Session::new();
        assert!(session.refresh(&LegacySource).await);

        let d = session.dashboard();
        assert_eq!(d.kpis.total_pep, 2);
        assert_eq!(d.status_ener.len(), 1);
        assert_eq!(d.status_ener[0].qtd, 2);
        assert!(d.status_conc.is_empty());
        assert!(d.reasons.is_empty());
        assert_eq!(d.comparison[0].name, "Norte");
    }

    #[tokio::test]
    async fn enumerations_fail_independently() {
        let session = Session::new();
        let e = session.load_enumerations(&LegacySource).await;
        assert_eq!(e.status_sap, vec!["Concluído"]);
        assert!(e.tipos.is_empty());
        assert_eq!(e.meses, vec!["2024-01"]);
        assert_eq!(session.enumerations(), e);
    }
}
