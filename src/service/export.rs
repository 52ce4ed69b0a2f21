use crate::error::Result;
use crate::models::{format_amount, Invoice};
use csv::Writer;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const CSV_HEADER: [&str; 8] = [
    "Invoice #",
    "Invoice ID",
    "Load ID",
    "Customer",
    "Amount",
    "Due Date",
    "Status",
    "Factoring",
];

/// 写出发票 CSV; 含逗号/引号/换行的字段加引号, 内部引号加倍
pub fn write_invoices_csv<'a, I, W>(invoices: I, writer: W) -> Result<usize>
where
    I: IntoIterator<Item = &'a Invoice>,
    W: Write,
{
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for inv in invoices {
        wtr.write_record([
            inv.invoice_number.clone().unwrap_or_default(),
            inv.invoice_id.clone(),
            inv.load_id.clone().unwrap_or_default(),
            inv.customer_name().to_string(),
            format_amount(&inv.amount_total),
            inv.due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            inv.status.label().to_string(),
            if inv.factoring { "Yes" } else { "No" }.to_string(),
        ])?;
        rows += 1;
    }

    wtr.flush()?;
    Ok(rows)
}

/// 导出到文件
pub fn export_to_file<'a, I>(invoices: I, output_path: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a Invoice>,
{
    let file = File::create(output_path)?;
    let rows = write_invoices_csv(invoices, file)?;
    tracing::info!("exported {} invoices to {}", rows, output_path.display());
    Ok(rows)
}
