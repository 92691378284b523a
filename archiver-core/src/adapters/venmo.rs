//! Venmo notification emails as a transaction source
//!
//! Messages are retrieved elsewhere; this module only turns their subject
//! and HTML body into transactions for a single Venmo account. Payments
//! ("X paid you $N", "You paid X $N") and bank transfers are recognized;
//! every other email is ignored.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{Account, Transaction};

pub const VENMO_BANK: &str = "Venmo";

/// One retrieved notification email
#[derive(Debug, Clone, Deserialize)]
pub struct VenmoMessage {
    pub subject: String,
    pub html: String,
    pub date: NaiveDate,
}

fn incoming_payee() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?) paid you").unwrap())
}

fn outgoing_payee() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^You paid (.+?) \p{Sc}").unwrap())
}

fn subject_amount() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d{1,5}\.\d\d)").unwrap())
}

/// Parse every message, skipping (and logging) the ones that fail
pub fn parse_messages(messages: &[VenmoMessage], account_id: &str) -> Vec<Transaction> {
    let transactions: Vec<Transaction> = messages
        .iter()
        .filter_map(|msg| match parse_message(msg, account_id) {
            Ok(tx) => tx,
            Err(e) => {
                warn!(subject = %msg.subject, error = %e, "failed to process Venmo email");
                None
            }
        })
        .collect();
    debug!(
        messages = messages.len(),
        transactions = transactions.len(),
        "parsed Venmo emails"
    );
    transactions
}

/// `Ok(None)` when the email is neither a payment nor a transfer
pub fn parse_message(msg: &VenmoMessage, account_id: &str) -> Result<Option<Transaction>> {
    if let Some(tx) = parse_payment(msg, account_id)? {
        return Ok(Some(tx));
    }
    parse_transfer(msg, account_id)
}

/// Wrap parsed transactions in the Venmo account aggregate
pub fn venmo_account(account_id: &str, transactions: Vec<Transaction>) -> Account {
    Account::new(account_id, VENMO_BANK, VENMO_BANK, "USD")
        .with_raw(json!({"source": "venmo_email"}))
        .with_transactions(transactions)
}

fn parse_payment(msg: &VenmoMessage, account_id: &str) -> Result<Option<Transaction>> {
    let subject = msg.subject.as_str();
    let (payee_re, sign) = if subject.contains(" paid you") {
        (incoming_payee(), Decimal::ONE)
    } else if subject.starts_with("You paid ") {
        (outgoing_payee(), Decimal::NEGATIVE_ONE)
    } else {
        return Ok(None);
    };

    let payee = payee_re
        .captures(subject)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::parse(format!("can't parse payee from subject: {}", subject)))?;

    let clean_subject = subject.replace(',', "");
    let amount = subject_amount()
        .captures(&clean_subject)
        .and_then(|c| c.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
        .ok_or_else(|| Error::parse(format!("can't parse amount from subject: {}", subject)))?;

    let doc = Html::parse_document(&msg.html);
    let description = description_before_see_transaction(&doc)?;
    let id = integer_after_label(&doc, "h3", "Transaction ID")?;

    Ok(Some(
        Transaction::new(id, account_id, midnight_utc(msg.date), sign * amount, description)
            .with_payee(Some(payee))
            .with_raw(origin(msg)),
    ))
}

fn parse_transfer(msg: &VenmoMessage, account_id: &str) -> Result<Option<Transaction>> {
    if !msg.subject.contains("transfer has been initiated") {
        return Ok(None);
    }
    let doc = Html::parse_document(&msg.html);

    let amount_text = value_after_label(&doc, "h2", "Transfer Amount")?;
    let amount = Decimal::from_str(amount_text.replace(['$', ','], "").trim())
        .map_err(|_| Error::parse(format!("can't parse transfer amount from '{}'", amount_text)))?;
    let id = integer_after_label(&doc, "h2", "Transfer transaction ID")?;
    let destination = value_after_label(&doc, "h2", "Destination")?;

    Ok(Some(
        Transaction::new(
            id,
            account_id,
            midnight_utc(msg.date),
            -amount,
            format!("Transfer to {}", destination),
        )
        .with_payee(Some(destination))
        .with_raw(origin(msg)),
    ))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::parse(format!("bad selector '{}': {}", css, e)))
}

/// Text of the paragraph right before `<p>See transaction</p>`
fn description_before_see_transaction(doc: &Html) -> Result<String> {
    let p = selector("p")?;
    let texts: Vec<String> = doc
        .select(&p)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();
    match texts.iter().position(|t| t == "See transaction") {
        Some(i) if i > 0 => Ok(texts[i - 1].clone()),
        _ => Err(Error::parse(
            "can't parse description: <p>See transaction</p> not found",
        )),
    }
}

/// Text of the first element following the `tag` whose text contains `label`
fn value_after_label(doc: &Html, tag: &str, label: &str) -> Result<String> {
    let sel = selector(tag)?;
    let label_el = doc
        .select(&sel)
        .find(|el| el.text().collect::<String>().contains(label))
        .ok_or_else(|| Error::parse(format!("label '{}' not found in email", label)))?;

    label_el
        .next_siblings()
        .find_map(ElementRef::wrap)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| Error::parse(format!("no element found after label '{}'", label)))
}

fn integer_after_label(doc: &Html, tag: &str, label: &str) -> Result<String> {
    let text = value_after_label(doc, tag, label)?;
    let id: u64 = text
        .parse()
        .map_err(|_| Error::parse(format!("can't parse {} from '{}'", label, text)))?;
    Ok(id.to_string())
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn origin(msg: &VenmoMessage) -> serde_json::Value {
    json!({"source": "venmo_email", "subject": msg.subject})
}
