use crate::error::Result;
use crate::types::{RawRow, Record, Valor};
use crate::util::{clean_label, month_key};
use csv::ReaderBuilder;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
    pub missing_pep: usize,
}

/// Load a matrix file: `.json` is an API payload (`[Record, ...]`), any
/// other extension a CSV export of the "Prazos SAP" sheet.
pub fn load_matrix(path: &Path) -> Result<(Vec<Record>, LoadReport)> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));
    let (records, report) = if is_json {
        load_json(std::fs::File::open(path)?)?
    } else {
        load_csv(std::fs::File::open(path)?)?
    };
    info!(
        path = %path.display(),
        total = report.total_rows,
        loaded = report.loaded_rows,
        parse_errors = report.parse_errors,
        "matrix loaded"
    );
    Ok((records, report))
}

pub fn load_json<R: Read>(reader: R) -> Result<(Vec<Record>, LoadReport)> {
    let raw: Vec<Record> = serde_json::from_reader(reader)?;
    let mut report = LoadReport {
        total_rows: raw.len(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(raw.len());
    for mut r in raw {
        r.pep = r.pep.trim().to_string();
        if r.pep.is_empty() {
            report.missing_pep += 1;
            continue;
        }
        if r.mes.is_empty() {
            r.mes = month_key(&r.data_conclusao);
        }
        records.push(r);
    }
    report.loaded_rows = records.len();
    Ok((records, report))
}

pub fn load_csv<R: Read>(reader: R) -> Result<(Vec<Record>, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut report = LoadReport::default();
    let mut records = Vec::new();

    for result in rdr.deserialize::<RawRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                report.parse_errors += 1;
                continue;
            }
        };
        match clean_row(row) {
            Some(r) => records.push(r),
            None => report.missing_pep += 1,
        }
    }

    report.loaded_rows = records.len();
    Ok((records, report))
}

/// First non-blank value among the spellings of one column, trimmed.
fn first_filled<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Same, but skipping spreadsheet placeholders such as `#N/A`.
fn first_label<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .find_map(|v| clean_label(v.as_deref()))
}

/// Sheet row to record; rows without a PEP are dropped.
fn clean_row(row: RawRow) -> Option<Record> {
    let pep = first_filled([row.pep])?;
    let data_conclusao =
        first_filled([row.data_conclusao, row.data_conclusao_alt]).unwrap_or_default();
    Some(Record {
        pep,
        prazo: first_filled([row.prazo, row.prazo_alt]).unwrap_or_default(),
        mes: month_key(&data_conclusao),
        data_conclusao,
        status_sap: first_filled([row.status_sap, row.status_sap_alt]).unwrap_or_default(),
        valor: first_filled([row.valor_rs, row.valor_rs_plain, row.valor_upper, row.valor])
            .map(Valor::Text)
            .unwrap_or_default(),
        seccional: first_filled([row.seccional, row.seccional_obra]).unwrap_or_default(),
        tipo: first_filled([row.tipo]).unwrap_or_default(),
        status_ener: first_label([row.status_ener, row.status_ener_upper]),
        status_conc: first_label([row.status_conc, row.status_conc_upper]),
        status_servico: first_label([
            row.status_servico,
            row.status_servico_upper,
            row.status_servico_title,
        ]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimension;
    use crate::util::parse_valor;

    #[test]
    fn csv_export_with_sheet_headers() {
        let data = "PEP,Prazo,DATA CONCLUSÃO,STATUS SAP,R$,SECCIONAL,TIPO,Status ENER\n\
                    A-1,10/01/2024,15/01/2024,Concluído,\"R$ 1.234,56\",Sul,OBRA,Energizado\n\
                    ,10/01/2024,,Pendente,10,Sul,OBRA,\n\
                    B-2,,,Pendente,,Norte,OBRA,#N/A\n";
        let (records, report) = load_csv(data.as_bytes()).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.missing_pep, 1);
        assert_eq!(report.loaded_rows, 2);

        let a = &records[0];
        assert_eq!(a.prazo, "10/01/2024");
        assert_eq!(a.mes, "2024-01");
        assert_eq!(parse_valor(&a.valor), 1234.56);
        assert_eq!(a.field(Dimension::StatusEner), "Energizado");
        assert_eq!(a.status_conc, None);

        let b = &records[1];
        assert_eq!(b.valor, Valor::Missing);
        assert_eq!(b.status_ener, None);
    }

    #[test]
    fn json_payload_keeps_numeric_and_text_values() {
        let data = r#"[
            {"pep":"A","valor":500,"seccional":"Sul","dataConclusao":"02/03/2024"},
            {"pep":"B","valor":"R$ 50,00","seccional":"Norte","mes":"2024-04"},
            {"pep":"  ","valor":1}
        ]"#;
        let (records, report) = load_json(data.as_bytes()).unwrap();
        assert_eq!(report.missing_pep, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mes, "2024-03");
        assert_eq!(records[1].mes, "2024-04");
        assert_eq!(parse_valor(&records[0].valor), 500.0);
        assert_eq!(parse_valor(&records[1].valor), 50.0);
    }

    #[test]
    fn repeated_header_spellings_fall_back_to_the_next_column() {
        let data = "PEP,SECCIONAL,\"SECCIONAL\nOBRA\",R$,VALOR,Status ENER,STATUS ENER\n\
                    A,Sul,Sul,10,,Energizado,\n\
                    B, ,Norte,,\"R$ 20,00\",#N/A,Pendente\n";
        let (records, report) = load_csv(data.as_bytes()).unwrap();
        assert_eq!(report.parse_errors, 0);
        assert_eq!(report.loaded_rows, 2);

        assert_eq!(records[0].seccional, "Sul");
        assert_eq!(parse_valor(&records[0].valor), 10.0);
        assert_eq!(records[0].status_ener.as_deref(), Some("Energizado"));

        assert_eq!(records[1].seccional, "Norte");
        assert_eq!(parse_valor(&records[1].valor), 20.0);
        assert_eq!(records[1].status_ener.as_deref(), Some("Pendente"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(load_json("{not json".as_bytes()).is_err());
    }
}
