//! Loan subcommands.

use super::{format_timestamp, parse_due_date, CliError, Runtime};
use archivo_core::{
    DocumentId, Loan, LoanId, LoanListQuery, LoanStatus, NewLoanRequest, ReturnBatch,
};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum LoanCommand {
    /// Request documents by inventory code
    Request(RequestArgs),
    /// Hand a pending request over to the requester
    Deliver(LoanRef),
    /// Decline a pending request
    Reject(RejectArgs),
    /// Withdraw a pending request
    Cancel(LoanRef),
    /// Receive some or all documents back
    Return(ReturnArgs),
    /// List loans, newest first
    List(ListArgs),
    /// Loan detail with documents and return receipts
    Show(LoanRef),
    /// Mark overdue loans as expired
    Expire,
}

#[derive(Args, Debug)]
pub struct LoanRef {
    pub loan_id: LoanId,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Inventory codes, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub codes: Vec<String>,
    #[arg(long)]
    pub purpose: String,
    /// Due date (YYYY-MM-DD); the configured loan period otherwise
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args, Debug)]
pub struct RejectArgs {
    pub loan_id: LoanId,
    #[arg(long)]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct ReturnArgs {
    pub loan_id: LoanId,
    /// Inventory codes being returned, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub codes: Vec<String>,
    /// Image file with the receiver's signature
    #[arg(long)]
    pub signature: PathBuf,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// pending | delivered | partial | returned | expired | rejected | cancelled
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

pub fn run(runtime: &Runtime, command: LoanCommand) -> Result<(), CliError> {
    match command {
        LoanCommand::Request(args) => request(runtime, args),
        LoanCommand::Deliver(args) => {
            let session = runtime.session()?;
            let loan = runtime.ctx().loans().deliver(session, args.loan_id)?;
            print_status(&loan);
            Ok(())
        }
        LoanCommand::Reject(args) => {
            let session = runtime.session()?;
            let loan = runtime
                .ctx()
                .loans()
                .reject(session, args.loan_id, &args.reason)?;
            print_status(&loan);
            Ok(())
        }
        LoanCommand::Cancel(args) => {
            let session = runtime.session()?;
            let loan = runtime.ctx().loans().cancel(session, args.loan_id)?;
            print_status(&loan);
            Ok(())
        }
        LoanCommand::Return(args) => return_documents(runtime, args),
        LoanCommand::List(args) => list(runtime, args),
        LoanCommand::Show(args) => show(runtime, args.loan_id),
        LoanCommand::Expire => {
            let session = runtime.session()?;
            if !session.role.has(archivo_core::Capability::ViewAllLoans) {
                return Err(CliError::Usage("only staff can expire loans".to_string()));
            }
            let now = runtime.ctx().clock().now_ms();
            let expired = runtime.ctx().loans().expire_overdue(now)?;
            println!("expired {} loan(s)", expired.len());
            for loan_id in expired {
                println!("  {loan_id}");
            }
            Ok(())
        }
    }
}

fn request(runtime: &Runtime, args: RequestArgs) -> Result<(), CliError> {
    let session = runtime.session()?;
    let document_ids = resolve_codes(runtime, &args.codes)?;
    let due_at = args.due.as_deref().map(parse_due_date).transpose()?;
    let loan = runtime.ctx().loans().request_loan(
        session,
        NewLoanRequest {
            document_ids,
            purpose: args.purpose,
            due_at,
        },
    )?;
    println!("loan {} requested, due {}", loan.id, format_timestamp(loan.due_at));
    Ok(())
}

fn return_documents(runtime: &Runtime, args: ReturnArgs) -> Result<(), CliError> {
    let session = runtime.session()?;
    let document_ids = resolve_codes(runtime, &args.codes)?;
    let signature = std::fs::read(&args.signature)?;
    let outcome = runtime.ctx().loans().return_documents(
        session,
        args.loan_id,
        ReturnBatch {
            document_ids,
            received_by: session.user_id,
            signature,
            notes: args.notes,
        },
    )?;
    println!(
        "received {}; {} of {} back, status {}",
        outcome.returned_now,
        outcome.returned_total,
        outcome.returned_total + outcome.outstanding,
        outcome.status.label()
    );
    Ok(())
}

fn list(runtime: &Runtime, args: ListArgs) -> Result<(), CliError> {
    let session = runtime.session()?;
    let status = args
        .status
        .as_deref()
        .map(|value| {
            LoanStatus::parse(value)
                .ok_or_else(|| CliError::Usage(format!("unknown loan status `{value}`")))
        })
        .transpose()?;
    let loans = runtime.ctx().loans().list_loans(
        session,
        LoanListQuery {
            requester: None,
            status,
            limit: args.limit,
            offset: args.offset,
        },
    )?;
    for loan in &loans {
        println!(
            "{}  {:<18} {}/{} returned  due {}  {}",
            loan.id,
            loan.status.label(),
            loan.returned_count(),
            loan.documents.len(),
            format_timestamp(loan.due_at),
            loan.purpose
        );
    }
    if loans.is_empty() {
        println!("no loans");
    }
    Ok(())
}

fn show(runtime: &Runtime, loan_id: LoanId) -> Result<(), CliError> {
    let session = runtime.session()?;
    let loans = runtime.ctx().loans();
    let inventory = runtime.ctx().inventory();
    let loan = loans.get_loan(session, loan_id)?;

    print_status(&loan);
    println!("purpose: {}", loan.purpose);
    println!("requested: {}", format_timestamp(loan.created_at));
    println!("due: {}", format_timestamp(loan.due_at));
    if let Some(reason) = &loan.rejection_reason {
        println!("rejection reason: {reason}");
    }
    for association in &loan.documents {
        let code = inventory
            .get_document(association.document_id)
            .map(|document| document.code)
            .unwrap_or_else(|_| association.document_id.to_string());
        match association.returned_at {
            Some(at) => println!("  {code:<16} returned {}", format_timestamp(at)),
            None => println!("  {code:<16} out"),
        }
    }
    for record in loans.list_return_records(session, loan_id)? {
        println!(
            "  receipt {} at {} ({} signature bytes)",
            record.document_id,
            format_timestamp(record.received_at),
            record.signature.len()
        );
    }
    Ok(())
}

fn resolve_codes(runtime: &Runtime, codes: &[String]) -> Result<Vec<DocumentId>, CliError> {
    let inventory = runtime.ctx().inventory();
    let mut ids = Vec::with_capacity(codes.len());
    for code in codes {
        let document = inventory
            .get_by_code(code)?
            .ok_or_else(|| CliError::Usage(format!("no document with code `{}`", code.trim())))?;
        ids.push(document.id);
    }
    Ok(ids)
}

fn print_status(loan: &Loan) {
    println!("loan {}: {}", loan.id, loan.status.label());
}
