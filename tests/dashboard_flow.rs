use async_trait::async_trait;
use prazos_sap::error::{ReportError, Result};
use prazos_sap::types::{CountMap, Dimension, Record, SortKey, SortDirection, SummaryEntry, Valor};
use prazos_sap::{logging, DataSource, FileSource, MatrixQuery, Session};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

const SHEET: &str = "\
PEP,PRAZO,DATA CONCLUSÃO,STATUS SAP,R$,SECCIONAL,TIPO
A,01/01/2024,10/01/2024,Concluído,\"R$ 100,00\",Sul,OBRA
B,01/01/2024,12/02/2024,Pendente,\"R$ 50,00\",Sul,MANUTENÇÃO
C,01/02/2024,20/02/2024,Concluído,200,Norte,OBRA
";

fn write_sheet(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("prazos_sap.csv");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(SHEET.as_bytes()).unwrap();
    path
}

#[tokio::test]
async fn file_backed_dashboard_matches_scenario() {
    logging::init_test();
    let dir = tempfile::tempdir().unwrap();
    let source = FileSource::new(write_sheet(&dir));
    let session = Session::new();

    session.load_enumerations(&source).await;
    assert!(session.refresh(&source).await);

    let d = session.dashboard();
    assert_eq!(
        d.comparison,
        vec![
            SummaryEntry { name: "Norte".into(), value: 200.0, qtd: 1 },
            SummaryEntry { name: "Sul".into(), value: 150.0, qtd: 2 },
        ]
    );
    assert_eq!(d.kpis.total_value, 350.0);
    assert_eq!(d.kpis.total_pep, 3);

    let lists = session.enumerations();
    assert_eq!(lists.tipos, vec!["MANUTENÇÃO", "OBRA"]);
    assert_eq!(lists.meses, vec!["2024-01", "2024-02"]);
    assert_eq!(lists.regions, vec!["Norte", "Sul"]);

    session.update_filters(|f| f.set_region(Some("Sul".into())));
    assert!(!session.needs_refresh());
    let d = session.dashboard();
    let peps: Vec<&str> = d.rows.iter().map(|r| r.pep.as_str()).collect();
    assert_eq!(peps, vec!["A", "B"]);
    assert_eq!(d.comparison.len(), 2);
    assert_eq!(d.kpis.total_value, 150.0);

    session.set_sort(SortKey::Rs);
    let spec = session.set_sort(SortKey::Rs);
    assert_eq!(spec.direction, SortDirection::Desc);
    let d = session.dashboard();
    assert_eq!(d.rows[0].pep, "A");
    assert_eq!(d.kpis.total_value, 150.0);
}

#[tokio::test]
async fn upstream_filters_refetch_records() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileSource::new(write_sheet(&dir));
    let session = Session::new();
    session.refresh(&source).await;

    session.update_filters(|f| f.tipo = Some("OBRA".into()));
    assert!(session.needs_refresh());
    assert!(session.refresh(&source).await);
    assert!(!session.needs_refresh());

    let d = session.dashboard();
    assert_eq!(d.kpis.total_pep, 2);
    // the region list follows the fetched records
    assert_eq!(d.regions, vec!["Norte", "Sul"]);
}

#[tokio::test]
async fn missing_file_degrades_to_empty_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileSource::new(dir.path().join("absent.csv"));
    let session = Session::new();

    assert!(session.refresh(&source).await);
    let lists = session.load_enumerations(&source).await;
    let d = session.dashboard();
    assert!(d.rows.is_empty());
    assert!(d.comparison.is_empty());
    assert_eq!(d.kpis.total_value, 0.0);
    assert!(lists.status_sap.is_empty());
}

/// The first records fetch blocks until released; later ones return at once.
struct GatedSource {
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

fn record(pep: &str) -> Record {
    Record {
        pep: pep.into(),
        seccional: "Sul".into(),
        valor: Valor::Number(1.0),
        ..Default::default()
    }
}

#[async_trait]
impl DataSource for GatedSource {
    async fn fetch_records(&self, _query: &MatrixQuery) -> Result<Vec<Record>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.started.notify_one();
            self.release.notified().await;
            return Ok(vec![record("STALE")]);
        }
        Ok(vec![record("FRESH")])
    }

    async fn status_sap_values(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn tipo_values(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn completion_months(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn regions(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fallback_counts(&self, _dimension: Dimension, _query: &MatrixQuery) -> Result<CountMap> {
        Err(ReportError::Unavailable("no counts".into()))
    }
}

#[tokio::test]
async fn superseded_refresh_is_discarded() {
    let source = Arc::new(GatedSource {
        calls: AtomicUsize::new(0),
        started: Notify::new(),
        release: Notify::new(),
    });
    let session = Arc::new(Session::new());

    let slow = {
        let source = Arc::clone(&source);
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.refresh(source.as_ref()).await })
    };
    source.started.notified().await;

    assert!(session.refresh(source.as_ref()).await);
    source.release.notify_one();
    assert!(!slow.await.unwrap());

    let records = session.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pep, "FRESH");
}

#[tokio::test]
async fn counts_sheet_feeds_status_charts_missing_from_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let counts = dir.path().join("status.csv");
    std::fs::write(
        &counts,
        "PEP,SECCIONAL,Status ENER\n\
         A,Sul,Energizado\n\
         B,Sul,Em andamento\n\
         C,Norte,Energizado\n\
         D,Sul,Energizado\n",
    )
    .unwrap();
    let source = FileSource::new(write_sheet(&dir)).with_counts(&counts);
    assert_eq!(source.counts_path(), Some(counts.as_path()));
    let session = Session::new();
    assert!(session.refresh(&source).await);

    let d = session.dashboard();
    assert_eq!(
        d.status_ener,
        vec![SummaryEntry { name: "Energizado".into(), value: 3.0, qtd: 3 }]
    );
    assert!(d.status_conc.is_empty());

    session.update_filters(|f| f.set_region(Some("Sul".into())));
    assert_eq!(session.dashboard().status_ener[0].qtd, 2);

    // without a counts sheet the matrix itself has nothing to count
    let plain = FileSource::new(write_sheet(&dir));
    let session = Session::new();
    session.refresh(&plain).await;
    assert!(session.dashboard().status_ener.is_empty());
}
