//! Deterministic payment computation and reconciliation.

use crate::models::Payment;
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounding tolerance for persisted monetary fields, in currency units.
pub const ROUNDING_TOLERANCE_CENTS: i64 = 1;

/// Tax breakdown of one payment. Fields are unrounded; callers round only
/// the figures they persist.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxBreakdown {
    pub gross: Decimal,
    pub vat_amount: Decimal,
    pub withholding_amount: Decimal,
    pub net_payable: Decimal,
}

/// Round a monetary figure to 2 decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn tolerance() -> Decimal {
    Decimal::new(ROUNDING_TOLERANCE_CENTS, 2)
}

/// Whether two persisted figures agree within the rounding tolerance.
pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= tolerance()
}

/// Combine base amount, approved expenses, and tax rates into a breakdown.
///
/// `gross = base + expenses`; VAT is zero under reverse charge; withholding
/// is computed on the VAT-exclusive gross. Pure: no rounding, no state.
pub fn compute(
    base_amount: Decimal,
    total_expenses: Decimal,
    vat_rate: Decimal,
    reverse_charge: bool,
    withholding_rate: Decimal,
) -> TaxBreakdown {
    let gross = base_amount + total_expenses;
    let vat_amount = if reverse_charge {
        Decimal::ZERO
    } else {
        gross * vat_rate / Decimal::ONE_HUNDRED
    };
    let withholding_amount = gross * withholding_rate / Decimal::ONE_HUNDRED;
    let net_payable = gross + vat_amount - withholding_amount;
    TaxBreakdown {
        gross,
        vat_amount,
        withholding_amount,
        net_payable,
    }
}

/// Recompute every derived field on a payment from its items, expenses, and
/// rates, correcting any stored figure that drifted beyond the tolerance.
///
/// Returns one notice per corrected field. A non-empty result means the
/// persisted record disagreed with a fresh computation; the caller decides
/// whether to log the correction or refuse a transition over it.
pub fn recompute(payment: &mut Payment) -> Vec<String> {
    let mut notices = Vec::new();

    // Item amounts are derived from quantity x rate.
    let mut item_total = Decimal::ZERO;
    for item in &mut payment.items {
        let derived = item.quantity * item.rate;
        let rounded = round_money(derived);
        if !within_tolerance(item.amount, rounded) {
            notices.push(format!(
                "item '{}' amount corrected from {} to {}",
                item.description, item.amount, rounded
            ));
            item.amount = rounded;
        }
        item_total += derived;
    }

    // Base amount: item sum when items exist, manual entry otherwise.
    let base = if payment.items.is_empty() {
        payment.base_amount
    } else {
        let rounded = round_money(item_total);
        if !within_tolerance(payment.base_amount, rounded) {
            notices.push(format!(
                "base amount corrected from {} to {}",
                payment.base_amount, rounded
            ));
        }
        payment.base_amount = rounded;
        item_total
    };

    // Only approved expenses count toward the total.
    let expense_total: Decimal = payment
        .expenses
        .iter()
        .filter(|e| e.approved)
        .map(|e| e.amount)
        .sum();
    let rounded_expenses = round_money(expense_total);
    if !within_tolerance(payment.total_expenses, rounded_expenses) {
        notices.push(format!(
            "total expenses corrected from {} to {}",
            payment.total_expenses, rounded_expenses
        ));
    }
    payment.total_expenses = rounded_expenses;

    let breakdown = compute(
        base,
        expense_total,
        payment.vat_rate,
        payment.apply_reverse_charge,
        payment.withholding_rate,
    );

    let vat = round_money(breakdown.vat_amount);
    if !within_tolerance(payment.vat_amount, vat) {
        notices.push(format!(
            "VAT amount corrected from {} to {}",
            payment.vat_amount, vat
        ));
    }
    payment.vat_amount = vat;

    let withholding = round_money(breakdown.withholding_amount);
    if !within_tolerance(payment.withholding_tax_amount, withholding) {
        notices.push(format!(
            "withholding amount corrected from {} to {}",
            payment.withholding_tax_amount, withholding
        ));
    }
    payment.withholding_tax_amount = withholding;

    let net = round_money(breakdown.net_payable);
    if !within_tolerance(payment.net_payable, net) {
        notices.push(format!(
            "net payable corrected from {} to {}",
            payment.net_payable, net
        ));
    }
    payment.net_payable = net;

    let company_net = round_money(breakdown.net_payable * payment.exchange_rate);
    if !within_tolerance(payment.net_amount_company_currency, company_net) {
        notices.push(format!(
            "company-currency net corrected from {} to {}",
            payment.net_amount_company_currency, company_net
        ));
    }
    payment.net_amount_company_currency = company_net;

    notices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateExpense, CreatePayment, CreatePaymentItem, Payment, ServiceCategory,
    };
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn draft(items: Vec<CreatePaymentItem>, expenses: Vec<CreateExpense>) -> Payment {
        Payment::try_new(&CreatePayment {
            freelancer_id: Uuid::new_v4(),
            contract_id: None,
            posting_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            currency: "EUR".to_string(),
            items,
            expenses,
            base_amount: None,
            transaction_is_b2b: true,
            service_category: ServiceCategory::Professional,
            manual_withholding_rate: None,
            metadata: None,
        })
        .unwrap()
    }

    fn item(quantity: i64, rate: Decimal) -> CreatePaymentItem {
        CreatePaymentItem {
            description: "consulting".to_string(),
            quantity: Decimal::from(quantity),
            rate,
        }
    }

    #[test]
    fn net_payable_formula_holds() {
        let breakdown = compute(
            Decimal::from(1000),
            Decimal::from(100),
            Decimal::from(21),
            false,
            Decimal::from(10),
        );
        assert_eq!(breakdown.gross, Decimal::from(1100));
        assert_eq!(breakdown.vat_amount, Decimal::from(231));
        assert_eq!(breakdown.withholding_amount, Decimal::from(110));
        assert_eq!(breakdown.net_payable, Decimal::from(1221));
    }

    #[test]
    fn reverse_charge_forces_zero_vat_regardless_of_rate() {
        let breakdown = compute(
            Decimal::from(1000),
            Decimal::ZERO,
            Decimal::from(21),
            true,
            Decimal::ZERO,
        );
        assert_eq!(breakdown.vat_amount, Decimal::ZERO);
        assert_eq!(breakdown.net_payable, Decimal::from(1000));
    }

    #[test]
    fn withholding_uses_vat_exclusive_gross() {
        let breakdown = compute(
            Decimal::from(1000),
            Decimal::ZERO,
            Decimal::from(21),
            false,
            Decimal::from(10),
        );
        // 10% of 1000, not of 1210.
        assert_eq!(breakdown.withholding_amount, Decimal::from(100));
    }

    #[test]
    fn persisted_fields_are_rounded_once_to_two_decimals() {
        // 3 x 33.333 = 99.999; the computation runs on the unrounded value
        // and only the persisted figures are rounded.
        let mut payment = draft(vec![item(3, Decimal::new(33_333, 3))], Vec::new());
        payment.vat_rate = Decimal::from(21);
        recompute(&mut payment);

        assert_eq!(payment.base_amount, Decimal::new(100_00, 2));
        assert_eq!(payment.vat_amount, Decimal::new(21_00, 2));
        assert_eq!(payment.net_payable, Decimal::new(121_00, 2));
    }

    #[test]
    fn only_approved_expenses_count() {
        let mut payment = draft(
            vec![item(1, Decimal::from(1000))],
            vec![
                CreateExpense {
                    description: "travel".to_string(),
                    amount: Decimal::from(120),
                    approved: true,
                },
                CreateExpense {
                    description: "hotel".to_string(),
                    amount: Decimal::from(300),
                    approved: false,
                },
            ],
        );
        recompute(&mut payment);

        assert_eq!(payment.total_expenses, Decimal::from(120));
        assert_eq!(payment.net_payable, Decimal::from(1120));
    }

    #[test]
    fn drifted_fields_are_corrected_with_notices() {
        let mut payment = draft(vec![item(10, Decimal::from(100))], Vec::new());
        // First pass fills the derived fields; a second pass is clean.
        recompute(&mut payment);
        let clean = recompute(&mut payment);
        assert!(clean.is_empty());

        // Hand-edit the stored tax amounts.
        payment.net_payable = Decimal::from(999);
        payment.withholding_tax_amount = Decimal::from(5);

        let notices = recompute(&mut payment);
        assert_eq!(notices.len(), 2);
        assert_eq!(payment.net_payable, Decimal::from(1000));
        assert_eq!(payment.withholding_tax_amount, Decimal::ZERO);
    }

    #[test]
    fn manual_base_amount_survives_recomputation() {
        let mut payment = draft(Vec::new(), Vec::new());
        payment.base_amount = Decimal::new(750_50, 2);
        let notices = recompute(&mut payment);
        assert_eq!(payment.base_amount, Decimal::new(750_50, 2));
        assert_eq!(payment.net_payable, Decimal::new(750_50, 2));
        assert!(notices.iter().all(|n| !n.contains("base amount")));
    }

    #[test]
    fn drift_within_tolerance_is_accepted() {
        let mut payment = draft(vec![item(1, Decimal::from(1000))], Vec::new());
        recompute(&mut payment);
        let net = payment.net_payable;
        payment.net_payable = net + Decimal::new(1, 2);

        let notices = recompute(&mut payment);
        assert!(notices.is_empty());
    }
}
