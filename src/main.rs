// Entry point and interactive console dashboard.
//
// The menu mirrors the web dashboard's controls:
// - option [1] (re)loads the matrix file and selector lists,
// - options [3]-[7] are the filter and sort controls,
// - option [8] exports the detail table and a JSON summary.
// Any change to upstream parameters triggers a refresh before the next view.
use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use prazos_sap::output;
use prazos_sap::types::{DashboardSnapshot, Dimension, SortKey};
use prazos_sap::util::{format_brl, format_int, parse_br_date};
use prazos_sap::{loader, logging, FileSource, Session};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{error, warn};

/// Console dashboard for the "Prazos SAP" work-order matrix.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Matrix file: CSV export of the sheet or JSON dump of the API payload
    #[arg(long, default_value = "prazos_sap.csv")]
    data: PathBuf,

    /// Sheet export used for the status count charts when the matrix lacks
    /// the status columns
    #[arg(long)]
    counts: Option<PathBuf>,

    /// Directory for exported files
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Rows shown per table preview
    #[arg(long, default_value_t = 10)]
    preview_rows: usize,
}

struct App {
    args: Args,
    rt: Runtime,
    source: FileSource,
    session: Session,
    loaded: bool,
}

fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

fn read_choice() -> String {
    prompt("Enter choice: ")
}

/// Numbered pick from `options`; `None` on blank or invalid input.
fn pick<'a>(title: &str, options: &'a [String]) -> Option<&'a str> {
    if options.is_empty() {
        println!("(nothing to choose from)\n");
        return None;
    }
    println!("{}", title);
    for (i, o) in options.iter().enumerate() {
        println!("[{}] {}", i + 1, o);
    }
    let idx: usize = read_choice().parse().ok()?;
    options.get(idx.checked_sub(1)?).map(String::as_str)
}

impl App {
    fn refresh_if_needed(&self) {
        if self.loaded && self.session.needs_refresh() {
            self.rt.block_on(self.session.refresh(&self.source));
        }
    }

    fn handle_load(&mut self) {
        match loader::load_matrix(&self.args.data) {
            Ok((_, report)) => {
                println!(
                    "Processing matrix... ({} rows read, {} loaded)",
                    format_int(report.total_rows),
                    format_int(report.loaded_rows)
                );
                if report.parse_errors > 0 {
                    println!(
                        "Note: {} rows skipped due to parse errors.",
                        format_int(report.parse_errors)
                    );
                }
                if report.missing_pep > 0 {
                    println!("Note: {} rows without PEP ignored.", format_int(report.missing_pep));
                }
                println!();
            }
            Err(e) => {
                error!(error = %e, path = %self.args.data.display(), "failed to load matrix");
                eprintln!("Failed to load file: {}\n", e);
                return;
            }
        }
        self.rt.block_on(self.session.load_enumerations(&self.source));
        self.rt.block_on(self.session.refresh(&self.source));
        self.loaded = true;
    }

    fn handle_view(&self) {
        let d = self.session.dashboard();
        let filters = self.session.filters();
        let rows = self.args.preview_rows;

        println!(
            "Valor Total: {}   PEP: {}\n",
            format_brl(d.kpis.total_value),
            format_int(d.kpis.total_pep)
        );
        let region = filters.effective_region().unwrap_or("Todas as Regiões");
        println!("Região: {}", region);
        for dim in Dimension::ALL {
            if let Some(label) = filters.active(dim) {
                println!("Filtro {}: {}", dim, label);
            }
        }
        if !filters.pep_search.is_empty() {
            println!("Pesquisa PEP: {}", filters.pep_search);
        }
        println!();

        for dim in Dimension::ALL {
            output::preview_table(dim.title(), d.series(dim), rows);
        }
        output::preview_table("Matriz", &d.rows, rows);
    }

    fn handle_chart_filter(&self) {
        let dims: Vec<String> = Dimension::ALL.iter().map(|d| d.title().to_string()).collect();
        let Some(title) = pick("Chart:", &dims) else { return };
        let Some(dim) = Dimension::ALL.into_iter().find(|d| d.title() == title) else {
            return;
        };
        let labels: Vec<String> = self
            .session
            .dashboard()
            .series(dim)
            .iter()
            .map(|e| e.name.clone())
            .collect();
        if let Some(label) = pick("Label (picking the active one clears it):", &labels) {
            let active = self.session.toggle_filter(dim, label);
            println!("Filtro {}: {}\n", if active { "aplicado" } else { "removido" }, label);
        }
    }

    fn handle_region(&self) {
        let mut options = vec!["Todas as Regiões".to_string()];
        options.extend(self.session.dashboard().regions);
        if let Some(choice) = pick("Região:", &options) {
            let region = (choice != options[0]).then(|| choice.to_string());
            self.session.update_filters(|f| f.set_region(region));
        }
    }

    fn handle_search(&self) {
        let term = prompt("PEP contains (blank clears): ");
        self.session.update_filters(|f| f.pep_search = term);
    }

    fn handle_sort(&self) {
        let columns: Vec<String> = SortKey::ALL.iter().map(|k| k.label().to_string()).collect();
        if let Some(label) = pick("Sort by:", &columns) {
            if let Some(key) = SortKey::ALL.into_iter().find(|k| k.label() == label) {
                let spec = self.session.set_sort(key);
                println!("Sorted by {} ({:?})\n", key.label(), spec.direction);
            }
        }
    }

    fn read_date(label: &str) -> Option<NaiveDate> {
        let raw = prompt(label);
        let date = parse_br_date(&raw);
        if date.is_none() && !raw.is_empty() {
            println!("Invalid date, expected DD/MM/YYYY.");
        }
        date
    }

    fn handle_sap_filters(&self) {
        let lists = self.session.enumerations();
        println!("[1] Status SAP  [2] Tipo  [3] Mês  [4] Período");
        match read_choice().as_str() {
            "1" => {
                let v = pick("Status SAP:", &lists.status_sap).map(str::to_string);
                self.session.update_filters(|f| f.status_sap = v);
            }
            "2" => {
                let v = pick("Tipo:", &lists.tipos).map(str::to_string);
                self.session.update_filters(|f| f.tipo = v);
            }
            "3" => {
                let v = pick("Mês:", &lists.meses).map(str::to_string);
                self.session.update_filters(|f| f.mes = v);
            }
            "4" => {
                let start = Self::read_date("Start (DD/MM/YYYY): ");
                let end = Self::read_date("End (DD/MM/YYYY): ");
                let range = start.zip(end).filter(|(s, e)| s <= e);
                if range.is_none() && (start.is_some() || end.is_some()) {
                    warn!("incomplete or inverted period ignored");
                }
                self.session.update_filters(|f| f.date_range = range);
            }
            _ => println!("Invalid choice.\n"),
        }
    }

    fn handle_export(&self) -> anyhow::Result<()> {
        let d = self.session.dashboard();
        let filters = self.session.filters();
        std::fs::create_dir_all(&self.args.out_dir)
            .with_context(|| format!("creating {}", self.args.out_dir.display()))?;

        let table = self.args.out_dir.join("prazos_sap.csv");
        output::write_csv(&table, &d.rows)?;
        let summary = self.args.out_dir.join("summary.json");
        let snapshot = DashboardSnapshot::new(&d, &filters, self.session.sort());
        output::write_json(&summary, &snapshot)?;

        println!("Exported {} rows to {}", format_int(d.rows.len()), table.display());
        println!("Summary saved to {}\n", summary.display());
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();
    let rt = Runtime::new().context("starting async runtime")?;
    let mut source = FileSource::new(args.data.clone());
    if let Some(counts) = &args.counts {
        source = source.with_counts(counts);
    }
    let mut app = App {
        source,
        args,
        rt,
        session: Session::new(),
        loaded: false,
    };

    loop {
        println!("Prazos SAP");
        println!("[1] Load data");
        println!("[2] View dashboard");
        println!("[3] Chart filter");
        println!("[4] Region");
        println!("[5] Search PEP");
        println!("[6] Sort table");
        println!("[7] SAP status / type / month / period");
        println!("[8] Export");
        println!("[9] Clear filters");
        println!("[0] Exit\n");
        let choice = read_choice();
        println!();
        if !app.loaded && !matches!(choice.as_str(), "1" | "0") {
            println!("Error: No data loaded. Please load the matrix first (option 1).\n");
            continue;
        }
        match choice.as_str() {
            "1" => app.handle_load(),
            "2" => app.handle_view(),
            "3" => app.handle_chart_filter(),
            "4" => app.handle_region(),
            "5" => app.handle_search(),
            "6" => app.handle_sort(),
            "7" => app.handle_sap_filters(),
            "8" => {
                if let Err(e) = app.handle_export() {
                    eprintln!("Write error: {:#}\n", e);
                }
            }
            "9" => {
                app.session.clear_filters();
                println!("Filters cleared.\n");
            }
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 0-9.\n"),
        }
        app.refresh_if_needed();
    }
    Ok(())
}
