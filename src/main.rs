use bigdecimal::BigDecimal;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use freight_finance::models::{format_currency, parse_amount, EmailDraft, Invoice, LineItem};
use freight_finance::service::{
    export, AssumeYes, BoardAction, Confirm, ConfirmWith, EmailOutcome, FactoringFilter,
    InvoiceDetail, PartyFilter, SortDirection, SortKey, StatusFilter, SubmitMode, SubmitOutcome,
};
use freight_finance::{
    ApiClient, AppConfig, FinanceBackend, FinanceError, InvoiceBoard, InvoiceForm,
    MessagingBackend, MessagingPanel,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Debug, Parser)]
#[command(name = "freight-finance", about = "Invoices, factoring and messaging for freight loads")]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// 所有确认提示自动同意
    #[arg(long, short = 'y', global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Invoices(InvoiceCommand),
    /// 财务汇总与回款预测
    Summary {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// 可开票运单
    Loads,
    #[command(subcommand)]
    Messages(MessageCommand),
}

#[derive(Debug, Subcommand)]
enum InvoiceCommand {
    List(ListArgs),
    Show { id: String },
    Export {
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        list: ListArgs,
    },
    Create(CreateArgs),
    Issue { id: String },
    Send { id: String },
    Void {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Dispute {
        id: String,
        #[arg(long)]
        reason: String,
    },
    Resolve {
        id: String,
        #[arg(long)]
        resolution: String,
    },
    Pay {
        id: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        reference: Option<String>,
    },
    Email {
        id: String,
        #[arg(long)]
        to: Vec<String>,
        #[arg(long)]
        cc: Vec<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    Factor { id: String },
    Package {
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Due,
    Amount,
    Status,
    Customer,
    Created,
    Number,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FactoringArg {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PartyArg {
    Issued,
    Billed,
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    #[arg(long, default_value = "all")]
    status: String,
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, value_enum, default_value = "due")]
    sort: SortArg,
    #[arg(long)]
    desc: bool,
    #[arg(long, value_enum)]
    factoring: Option<FactoringArg>,
    #[arg(long, value_enum)]
    party: Option<PartyArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Draft,
    Issue,
    IssueSend,
}

#[derive(Debug, Clone, Args)]
struct CreateArgs {
    #[arg(long)]
    load: String,
    /// 明细行 "描述:数量:单价", 可重复
    #[arg(long = "item")]
    items: Vec<String>,
    #[arg(long)]
    fuel: Option<String>,
    #[arg(long)]
    other: Option<String>,
    #[arg(long)]
    discount: Option<String>,
    /// 覆盖总金额
    #[arg(long)]
    total: Option<String>,
    #[arg(long)]
    due_days: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, value_enum, default_value = "draft")]
    mode: ModeArg,
}

#[derive(Debug, Subcommand)]
enum MessageCommand {
    Threads,
    /// 打开线程并持续输出新消息 (Ctrl-C 退出)
    Watch { thread: String },
    Send { thread: String, body: String },
}

/// 终端确认
fn stdin_confirm(message: &str) -> bool {
    print!("{message} [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn parse_money(field: &str, raw: &str) -> Result<BigDecimal, FinanceError> {
    parse_amount(raw).ok_or_else(|| FinanceError::validation(format!("Invalid {field}: {raw}")))
}

fn parse_item(raw: &str) -> Result<LineItem, FinanceError> {
    let mut parts = raw.rsplitn(3, ':');
    let (rate, qty, desc) = (parts.next(), parts.next(), parts.next());
    match (desc, qty, rate) {
        (Some(desc), Some(qty), Some(rate)) => Ok(LineItem::new(
            desc.trim(),
            parse_money("quantity", qty)?,
            parse_money("rate", rate)?,
        )),
        _ => Err(FinanceError::validation(format!(
            "Line items look like \"Line Haul:1:500\", got \"{raw}\""
        ))),
    }
}

fn apply_list_args(board: &mut InvoiceBoard, args: &ListArgs) -> Result<(), FinanceError> {
    board.dispatch(BoardAction::SetStatusFilter(StatusFilter::parse(&args.status)?));
    board.dispatch(BoardAction::SetSearch(args.search.clone()));
    board.dispatch(BoardAction::SetFactoringFilter(match args.factoring {
        None => FactoringFilter::All,
        Some(FactoringArg::Yes) => FactoringFilter::Factored,
        Some(FactoringArg::No) => FactoringFilter::NotFactored,
    }));
    board.dispatch(BoardAction::SetPartyFilter(match args.party {
        None => PartyFilter::All,
        Some(PartyArg::Issued) => PartyFilter::IssuedByMe,
        Some(PartyArg::Billed) => PartyFilter::BilledToMe,
    }));
    board.dispatch(BoardAction::SortBy(match args.sort {
        SortArg::Due => SortKey::DueDate,
        SortArg::Amount => SortKey::Amount,
        SortArg::Status => SortKey::Status,
        SortArg::Customer => SortKey::Customer,
        SortArg::Created => SortKey::Created,
        SortArg::Number => SortKey::Number,
    }));
    board.dispatch(BoardAction::SetSortDirection(if args.desc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    }));
    Ok(())
}

fn print_invoice_row(inv: &Invoice) {
    println!(
        "{:<14} {:<24} {:<12} {:>14} {:<10} {:<15} {}",
        inv.display_number(),
        inv.customer_name(),
        inv.load_id.as_deref().unwrap_or("-"),
        format_currency(&inv.amount_total, &inv.currency),
        inv.due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string()),
        inv.status.label(),
        if inv.factoring { "factored" } else { "" }
    );
}

async fn run_invoices(
    cmd: InvoiceCommand,
    config: &AppConfig,
    api: Arc<ApiClient>,
    prompt: &dyn Confirm,
) -> Result<(), FinanceError> {
    if let InvoiceCommand::Create(args) = &cmd {
        return create_invoice(args, api.as_ref(), prompt).await;
    }
    if let InvoiceCommand::Show { id } = &cmd {
        let detail = InvoiceDetail::load(api.as_ref(), id).await?;
        print!("{}", detail.render_text());
        let actions: Vec<_> = detail
            .available_actions(config.session.role)
            .iter()
            .map(|a| a.label())
            .collect();
        println!("\nActions: {}", actions.join(", "));
        return Ok(());
    }

    let backend: Arc<dyn FinanceBackend> = api;
    let mut board = InvoiceBoard::new(backend, config.session.role, config.session.uid.clone());
    board.refresh().await?;

    match cmd {
        InvoiceCommand::List(args) => {
            apply_list_args(&mut board, &args)?;
            for inv in board.visible() {
                print_invoice_row(inv);
            }
            if let Some(summary) = &board.state().summary {
                let cur = summary.currency.as_deref().unwrap_or("USD");
                println!(
                    "\nopen {} ({})  overdue {} ({})",
                    format_currency(&summary.open_total, cur),
                    summary.open_count,
                    format_currency(&summary.overdue_total, cur),
                    summary.overdue_count
                );
            }
        }
        InvoiceCommand::Export { out, list } => {
            apply_list_args(&mut board, &list)?;
            let rows = export::export_to_file(board.visible(), &out)?;
            println!("Exported {} invoices to {}", rows, out.display());
        }
        InvoiceCommand::Issue { id } => board.issue(&id).await?,
        InvoiceCommand::Send { id } => board.send(&id).await?,
        InvoiceCommand::Void { id, reason } => board.void(&id, reason.as_deref()).await?,
        InvoiceCommand::Dispute { id, reason } => board.dispute(&id, &reason).await?,
        InvoiceCommand::Resolve { id, resolution } => {
            board.resolve_dispute(&id, &resolution).await?
        }
        InvoiceCommand::Pay {
            id,
            amount,
            method,
            reference,
        } => {
            let amount = parse_money("amount", &amount)?;
            board
                .record_payment(&id, amount, method, reference, Utc::now())
                .await?
        }
        InvoiceCommand::Email {
            id,
            to,
            cc,
            subject,
            body,
        } => {
            let mut draft = EmailDraft::for_invoice(board.find(&id)?);
            if !to.is_empty() {
                draft.to = to;
            }
            if !cc.is_empty() {
                draft.cc = cc;
            }
            if let Some(s) = subject {
                draft.subject = s;
            }
            if let Some(b) = body {
                draft.body = b;
            }
            match board.email(&id, &draft, prompt).await? {
                EmailOutcome::Sent { issued_first } if issued_first => {
                    println!("Invoice issued and emailed")
                }
                EmailOutcome::Sent { .. } => println!("Invoice emailed"),
                EmailOutcome::Cancelled => println!("Cancelled"),
            }
        }
        InvoiceCommand::Factor { id } => board.submit_factoring(&id).await?,
        InvoiceCommand::Package { id, out } => {
            let bytes = board.download_package(&id).await?;
            std::fs::write(&out, &bytes)?;
            println!("Saved {} bytes to {}", bytes.len(), out.display());
        }
        InvoiceCommand::Create(_) | InvoiceCommand::Show { .. } => {}
    }

    if let Some(notice) = &board.state().notice {
        println!("{notice}");
    }
    Ok(())
}

async fn create_invoice(
    args: &CreateArgs,
    api: &ApiClient,
    prompt: &dyn Confirm,
) -> Result<(), FinanceError> {
    let loads = api.eligible_loads().await?;
    let load = loads
        .into_iter()
        .find(|l| l.load_id == args.load || l.load_number.as_deref() == Some(args.load.as_str()))
        .ok_or_else(|| {
            FinanceError::validation(format!("Load {} is not eligible for invoicing", args.load))
        })?;

    let mut form = InvoiceForm::new();
    for raw in &args.items {
        form.add_line_item(parse_item(raw)?);
    }
    form.select_load(load);
    if let Some(v) = &args.fuel {
        form.fuel_surcharge = parse_money("fuel surcharge", v)?;
    }
    if let Some(v) = &args.other {
        form.other_charges = parse_money("other charges", v)?;
    }
    if let Some(v) = &args.discount {
        form.discount = parse_money("discount", v)?;
    }
    form.set_override(args.total.as_deref());
    form.due_in_days = args.due_days.clone().unwrap_or_default();
    form.notes = args.notes.clone().unwrap_or_default();

    let totals = form.totals();
    println!(
        "Subtotal {}  Charges {}  Discount {}  Total {}",
        format_currency(&totals.subtotal, &form.currency),
        format_currency(&totals.charges, &form.currency),
        format_currency(&totals.discount, &form.currency),
        format_currency(&totals.total, &form.currency)
    );

    let mode = match args.mode {
        ModeArg::Draft => SubmitMode::Draft,
        ModeArg::Issue => SubmitMode::Issue,
        ModeArg::IssueSend => SubmitMode::IssueSend,
    };
    match form.submit(api, mode, prompt, Utc::now()).await? {
        SubmitOutcome::Created {
            invoice,
            issued,
            email,
        } => {
            println!(
                "Created invoice {} ({})",
                invoice.display_number(),
                if issued { "issued" } else { "draft" }
            );
            if let Some(err) = &form.error {
                eprintln!("warning: {err}");
            }
            if let Some(draft) = email {
                draft.validate()?;
                api.email_invoice(&invoice.invoice_id, &draft).await?;
                println!("Emailed to {}", draft.to.join(", "));
            }
        }
        SubmitOutcome::Cancelled => println!("Cancelled"),
    }
    Ok(())
}

async fn run_messages(
    cmd: MessageCommand,
    config: &AppConfig,
    api: Arc<ApiClient>,
) -> Result<(), FinanceError> {
    let backend: Arc<dyn MessagingBackend> = api;
    let panel = MessagingPanel::new(backend);

    match cmd {
        MessageCommand::Threads => {
            panel.load_threads().await?;
            panel.refresh_unread().await?;
            for t in panel.snapshot().await.threads.values() {
                println!(
                    "{:<20} {:<32} unread {}",
                    t.thread_id,
                    t.title.as_deref().unwrap_or(""),
                    t.unread_count
                );
            }
        }
        MessageCommand::Send { thread, body } => {
            panel.open_thread(&thread).await?;
            let msg = panel.send_message(&body).await?;
            println!("Sent {}", msg.message_id);
        }
        MessageCommand::Watch { thread } => {
            panel.load_threads().await?;
            panel.open_thread(&thread).await?;
            panel.start_unread_poll(config.unread_poll_interval());

            let mut printed = 0;
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let snap = panel.snapshot().await;
                        for msg in snap.messages.values().skip(printed) {
                            println!(
                                "[{}] {}: {}",
                                msg.created_at.format("%H:%M:%S"),
                                msg.sender_uid,
                                msg.body
                            );
                        }
                        printed = snap.messages.len();
                        if let Some(err) = snap.error {
                            eprintln!("error: {err}");
                            panel.dismiss_error().await;
                        }
                    }
                }
            }
            panel.shutdown();
        }
    }
    Ok(())
}

async fn show_summary(api: &ApiClient, days: u32) -> Result<(), FinanceError> {
    let (summary, forecast) =
        futures::try_join!(api.finance_summary(), api.finance_forecast(days))?;
    let cur = summary.currency.clone().unwrap_or_else(|| "USD".to_string());
    println!(
        "Open:      {} ({})",
        format_currency(&summary.open_total, &cur),
        summary.open_count
    );
    println!(
        "Overdue:   {} ({})",
        format_currency(&summary.overdue_total, &cur),
        summary.overdue_count
    );
    println!("Paid 30d:  {}", format_currency(&summary.paid_last_30_days, &cur));
    println!(
        "Drafts:    {}  Disputed: {}",
        summary.draft_count, summary.disputed_count
    );
    println!(
        "\nExpected in {} days: {}",
        days,
        format_currency(&forecast.total_expected, &cur)
    );
    for b in &forecast.buckets {
        println!(
            "  {}  {:>14}  ({} invoices)",
            b.period_start,
            format_currency(&b.expected, &cur),
            b.invoice_count
        );
    }
    Ok(())
}

async fn show_loads(api: &ApiClient) -> Result<(), FinanceError> {
    for l in api.eligible_loads().await? {
        println!(
            "{:<14} {:<40} {:<12} {}",
            l.display_number(),
            l.route(),
            l.status.as_deref().unwrap_or("-"),
            if l.has_pod { "POD" } else { "no POD" }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_max_level(tracing::Level::from_str(&config.log.level).unwrap_or(tracing::Level::INFO))
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        "api {} as {:?} ({})",
        config.api.base_url,
        config.session.role,
        config.session.uid.as_deref().unwrap_or("anonymous")
    );

    let api = Arc::new(ApiClient::from_config(&config)?);
    let prompt: Box<dyn Confirm> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(ConfirmWith(stdin_confirm))
    };

    let result = match cli.command {
        Command::Invoices(cmd) => run_invoices(cmd, &config, api, prompt.as_ref()).await,
        Command::Messages(cmd) => run_messages(cmd, &config, api).await,
        Command::Summary { days } => show_summary(api.as_ref(), days).await,
        Command::Loads => show_loads(api.as_ref()).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}
