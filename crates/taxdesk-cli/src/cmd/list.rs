use super::{Context, FILING_ROW_HEADER, check, write_filing_row};
use crate::output::{OutputMode, pretty_section, render};
use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use std::io::{self, Write};
use taxdesk_core::model::{ClientId, FilingStatus, FilingType, Priority, TaxYear, UserId};
use taxdesk_core::{FilingFilter, FilingPage, FilingSort};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only this client's filings.
    #[arg(long)]
    pub client: Option<ClientId>,

    /// Only filings assigned to this CA.
    #[arg(long)]
    pub ca: Option<UserId>,

    /// Only these statuses (repeatable or comma-separated).
    #[arg(long = "status", value_name = "STATUS", value_delimiter = ',')]
    pub statuses: Vec<FilingStatus>,

    /// Only this filing type.
    #[arg(long = "type", value_name = "TYPE")]
    pub filing_type: Option<FilingType>,

    /// Only this priority.
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Only this tax year.
    #[arg(long = "year", value_name = "YYYY-YYYY")]
    pub tax_year: Option<TaxYear>,

    /// Case-insensitive text match over notes and tax year.
    #[arg(long)]
    pub search: Option<String>,

    /// Earliest due date, inclusive.
    #[arg(long = "due-from", value_name = "DATE")]
    pub due_from: Option<NaiveDate>,

    /// Latest due date, inclusive.
    #[arg(long = "due-to", value_name = "DATE")]
    pub due_to: Option<NaiveDate>,

    /// Sort order: created_desc, created_asc, updated_desc, due_asc, priority.
    #[arg(long, default_value = "created_desc")]
    pub sort: FilingSort,

    /// Maximum number of results.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Number of results to skip.
    #[arg(long)]
    pub offset: Option<u32>,
}

impl ListArgs {
    fn to_filter(&self) -> FilingFilter {
        FilingFilter {
            client_id: self.client,
            ca_id: self.ca,
            statuses: self.statuses.clone(),
            filing_type: self.filing_type,
            priority: self.priority,
            tax_year: self.tax_year,
            search: self.search.clone(),
            due_from: self.due_from,
            due_to: self.due_to,
            sort: self.sort,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

pub fn run_list(args: &ListArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let page = check(
        ctx.output,
        ctx.engine(&store).list_filings(args.to_filter()),
    )?;
    render(ctx.output, &page, |page, mode, w| {
        write_page(w, page, mode, "Filings")
    })
}

/// Shared by `list` and `deadlines`.
pub fn write_page(
    w: &mut dyn Write,
    page: &FilingPage,
    mode: OutputMode,
    heading: &str,
) -> io::Result<()> {
    if mode == OutputMode::Pretty {
        pretty_section(
            w,
            &format!(
                "{heading} ({} of {}, offset {})",
                page.filings.len(),
                page.total,
                page.offset
            ),
        )?;
        if page.filings.is_empty() {
            return writeln!(w, "(none)");
        }
    }

    if !page.filings.is_empty() {
        writeln!(w, "{FILING_ROW_HEADER}")?;
    }
    for filing in &page.filings {
        write_filing_row(w, filing)?;
    }
    Ok(())
}
