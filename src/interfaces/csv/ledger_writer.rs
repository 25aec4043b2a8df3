use crate::domain::invoice::{BillingPeriod, InvoiceStatus, RentInvoice};
use crate::domain::ledger::{RentStatus, TenantLedger};
use crate::domain::money::Money;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow<'a> {
    tenant: u32,
    name: &'a str,
    property: u32,
    water_bill: Money,
    arrears: Money,
    total_monthly_bill: Money,
    total_billed: Money,
    total_paid: Money,
    outstanding: Money,
    rent_status: RentStatus,
}

#[derive(Serialize)]
struct InvoiceRow<'a> {
    invoice: &'a str,
    tenant: u32,
    period: BillingPeriod,
    rent: Money,
    water: Money,
    arrears: Money,
    total: Money,
    paid: Money,
    status: InvoiceStatus,
    due_on: NaiveDate,
}

/// Writes ledgers and invoices as CSV, one record per row.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_ledgers<I>(&mut self, ledgers: I) -> Result<()>
    where
        I: IntoIterator<Item = TenantLedger>,
    {
        for ledger in ledgers {
            self.writer.serialize(LedgerRow {
                tenant: ledger.tenant,
                name: &ledger.name,
                property: ledger.property,
                water_bill: ledger.water_bill,
                arrears: ledger.arrears,
                total_monthly_bill: ledger.total_monthly_bill,
                total_billed: ledger.total_billed,
                total_paid: ledger.total_paid,
                outstanding: ledger.outstanding(),
                rent_status: ledger.rent_status,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_invoices<I>(&mut self, invoices: I) -> Result<()>
    where
        I: IntoIterator<Item = RentInvoice>,
    {
        for invoice in invoices {
            self.writer.serialize(InvoiceRow {
                invoice: invoice.id.as_str(),
                tenant: invoice.tenant,
                period: invoice.period,
                rent: invoice.rent,
                water: invoice.water,
                arrears: invoice.arrears_brought_forward,
                total: invoice.total_amount,
                paid: invoice.amount_paid,
                status: invoice.status,
                due_on: invoice.due_on,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::phone::PhoneNumber;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ledger_rows() {
        let mut ledger =
            TenantLedger::new(1, "Wanjiku", PhoneNumber::parse("0712345678").unwrap(), 10);
        ledger.total_billed = Money::new(dec!(12600));
        ledger.total_paid = Money::new(dec!(5000));
        ledger.rent_status = RentStatus::Partial;

        let mut out = Vec::new();
        LedgerWriter::new(&mut out).write_ledgers(vec![ledger]).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("tenant,name,property,water_bill,arrears,total_monthly_bill,total_billed,total_paid,outstanding,rent_status")
        );
        assert_eq!(lines.next(), Some("1,Wanjiku,10,0,0,0,12600,5000,7600,partial"));
    }

    #[test]
    fn test_invoice_status_uses_snake_case() {
        let issued = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        let mut invoice = RentInvoice::new(
            1,
            "2024-10".parse().unwrap(),
            Money::new(dec!(12000)),
            Money::new(dec!(600)),
            Money::ZERO,
            issued,
            NaiveDate::from_ymd_opt(2024, 10, 6).unwrap(),
        )
        .unwrap();
        invoice.apply_payment(Money::new(dec!(5000))).unwrap();

        let mut out = Vec::new();
        LedgerWriter::new(&mut out).write_invoices(vec![invoice]).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text.lines().nth(1),
            Some("INV-1-202410,1,2024-10,12000,600,0,12600,5000,partially_paid,2024-10-06")
        );
    }
}
