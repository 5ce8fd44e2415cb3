//! Request, response and remote record types.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ValidationError;

/// Body of `POST /transaction/add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// Account name or id.
    pub account: String,
    /// Payee name.
    pub payee: String,
    /// Category name.
    #[serde(default)]
    pub category: Option<String>,
    /// Amount; only the magnitude is used.
    ///
    /// Held as a 96-bit `Decimal`, so magnitudes above `Decimal::MAX`
    /// (about 7.9e28) are rejected as malformed.
    #[schema(value_type = f64)]
    pub amount: Decimal,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Money leaving the account (`true`) or arriving (`false`).
    #[serde(rename = "payment", default = "default_true")]
    pub is_payment: bool,
    /// Mark the transaction as cleared.
    #[serde(rename = "cleared", default)]
    pub is_cleared: bool,
}

fn default_true() -> bool {
    true
}

impl TransactionRequest {
    /// Amount as recorded: `-|amount|` for payments, `+|amount|` otherwise.
    ///
    /// The sign sent by the client is ignored.
    pub fn signed_amount(&self) -> Decimal {
        if self.is_payment {
            -self.amount.abs()
        } else {
            self.amount.abs()
        }
    }

    /// Build the record staged on the remote session.
    pub fn to_new_transaction(&self, date: NaiveDate) -> NewTransaction {
        NewTransaction {
            date,
            account: self.account.clone(),
            payee: self.payee.clone(),
            category: self.category.clone(),
            amount: self.signed_amount(),
            notes: self.notes.clone(),
            cleared: self.is_cleared,
        }
    }
}

/// Transaction as sent to the budgeting server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub account: String,
    pub payee: String,
    pub category: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub notes: Option<String>,
    pub cleared: bool,
}

/// Identifier assigned to a staged transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Month selector for the budget endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetQuery {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl BudgetQuery {
    /// First day of the given month.
    pub fn for_month(year: i32, month: u32) -> Self {
        Self { year, month, day: 1 }
    }

    /// First day of the month containing `today`.
    pub fn current(today: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::for_month(today.year(), today.month())
    }

    /// Resolve to a calendar date; out-of-range components are rejected, never clamped.
    pub fn date(&self) -> Result<NaiveDate, ValidationError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or(
            ValidationError::InvalidDate {
                year: self.year,
                month: self.month,
                day: self.day,
            },
        )
    }
}

/// Budget history returned by the server, one entry per month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetHistory {
    #[serde(default)]
    pub months: Vec<BudgetMonth>,
}

impl BudgetHistory {
    /// The month containing `date`, if the history covers it.
    pub fn from_month(&self, date: NaiveDate) -> Option<&BudgetMonth> {
        let key = month_key(date);
        self.months.iter().find(|m| m.month == key)
    }
}

/// One month of budget data. Fields other than `month` are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetMonth {
    /// `YYYY-MM`.
    pub month: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BudgetMonth {
    /// Plain JSON mapping including the `month` key.
    pub fn as_map(&self) -> Map<String, Value> {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert("month".to_string(), Value::String(self.month.clone()));
        map.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        map
    }
}

/// `YYYY-MM` key used by the server for budget months.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Account record as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub offbudget: bool,
}

/// Entry of `GET /accounts/balances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountBalanceView {
    pub name: String,
    pub balance: f64,
    pub id: String,
    pub closed: bool,
    pub offbudget: bool,
}

impl From<&Account> for AccountBalanceView {
    fn from(account: &Account) -> Self {
        Self {
            name: account.name.clone(),
            balance: account
                .balance
                .and_then(|b| b.to_f64())
                .unwrap_or(0.0),
            id: account.id.clone(),
            closed: account.closed,
            offbudget: account.offbudget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, is_payment: bool) -> TransactionRequest {
        TransactionRequest {
            account: "Checking".to_string(),
            payee: "Grocer".to_string(),
            category: None,
            amount,
            notes: None,
            is_payment,
            is_cleared: false,
        }
    }

    #[test]
    fn payments_are_always_negative() {
        for amount in [dec!(12.34), dec!(-12.34), dec!(0), dec!(1000000.01)] {
            assert_eq!(request(amount, true).signed_amount(), -amount.abs());
        }
    }

    #[test]
    fn deposits_are_always_positive() {
        for amount in [dec!(12.34), dec!(-12.34), dec!(0.01)] {
            assert_eq!(request(amount, false).signed_amount(), amount.abs());
        }
    }

    #[test]
    fn request_defaults_match_wire_format() {
        let req: TransactionRequest = serde_json::from_str(
            r#"{"account": "Checking", "payee": "Grocer", "amount": 12.5}"#,
        )
        .unwrap();

        assert_eq!(req.amount, dec!(12.5));
        assert!(req.is_payment);
        assert!(!req.is_cleared);
        assert_eq!(req.category, None);
        assert_eq!(req.notes, None);
    }

    #[test]
    fn amount_beyond_decimal_range_is_rejected() {
        let result = serde_json::from_str::<TransactionRequest>(
            r#"{"account": "Checking", "payee": "Grocer", "amount": 1e30}"#,
        );
        assert!(result.is_err());

        let req: TransactionRequest = serde_json::from_str(
            r#"{"account": "Checking", "payee": "Grocer", "amount": 1e20, "payment": false}"#,
        )
        .unwrap();
        assert_eq!(req.signed_amount(), dec!(100000000000000000000));
    }

    #[test]
    fn new_transaction_carries_signed_amount() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let mut req = request(dec!(-20), false);
        req.is_cleared = true;

        let tx = req.to_new_transaction(date);
        assert_eq!(tx.amount, dec!(20));
        assert_eq!(tx.date, date);
        assert!(tx.cleared);

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["amount"], "20");
        assert_eq!(json["date"], "2024-05-17");
    }

    #[test]
    fn invalid_dates_are_rejected() {
        for (year, month, day) in [(2024, 13, 1), (2024, 1, 32), (2023, 2, 30), (2024, 0, 1)] {
            let query = BudgetQuery { year, month, day };
            assert_eq!(
                query.date(),
                Err(ValidationError::InvalidDate { year, month, day })
            );
        }
    }

    #[test]
    fn current_query_is_first_of_month() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let query = BudgetQuery::current(today);
        assert_eq!(query, BudgetQuery { year: 2024, month: 2, day: 1 });
        assert_eq!(query.date().unwrap(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn history_selects_matching_month() {
        let history: BudgetHistory = serde_json::from_str(
            r#"{"months": [
                {"month": "2024-04", "budgeted": 100},
                {"month": "2024-05", "budgeted": 250, "spent": -75}
            ]}"#,
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let month = history.from_month(date).unwrap();
        let map = month.as_map();
        assert_eq!(map["month"], "2024-05");
        assert_eq!(map["budgeted"], 250);
        assert_eq!(map["spent"], -75);

        let missing = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(history.from_month(missing).is_none());
    }

    #[test]
    fn missing_balance_projects_to_zero() {
        let account = Account {
            id: "a1".to_string(),
            name: "Savings".to_string(),
            balance: None,
            closed: false,
            offbudget: true,
        };

        let view = AccountBalanceView::from(&account);
        assert_eq!(view.balance, 0.0);
        assert!(view.offbudget);
    }

    #[test]
    fn present_balance_projects_to_float() {
        let account = Account {
            id: "a2".to_string(),
            name: "Checking".to_string(),
            balance: Some(dec!(12.5)),
            closed: true,
            offbudget: false,
        };

        let view = AccountBalanceView::from(&account);
        assert_eq!(view.balance, 12.5);
        assert!(view.closed);
    }
}
