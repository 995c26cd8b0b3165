use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::entities::voucher::{VoucherKind, VoucherValueType};
use crate::entities::VoucherModel;

/// Coin redemption is capped at this share of the item subtotal regardless
/// of the requested amount or balance.
pub const COIN_SUBTOTAL_SHARE: Decimal = dec!(0.10);

/// One cart line as seen by the pricing engine: quantity and the product's
/// effective unit price.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PricedLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Voucher terms relevant to pricing, detached from the stored model.
#[derive(Debug, Clone)]
pub struct VoucherTerms {
    pub kind: VoucherKind,
    pub value_type: VoucherValueType,
    pub value: Decimal,
    pub max_amount: Option<Decimal>,
}

impl From<&VoucherModel> for VoucherTerms {
    fn from(voucher: &VoucherModel) -> Self {
        Self {
            kind: voucher.kind,
            value_type: voucher.value_type,
            value: voucher.value,
            max_amount: voucher.max_amount,
        }
    }
}

/// The authoritative total breakdown for a cart or order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub voucher_discount: Decimal,
    pub voucher_cashback: Decimal,
    pub total: Decimal,
    pub coin_applied: Decimal,
    pub total_payment: Decimal,
}

/// Computes the full total breakdown. Pure; malformed inputs are rejected by
/// validation upstream, the only normalization applied here is the zero
/// floor on `total`, `coin_applied`, and `total_payment`.
///
/// - discount vouchers reduce the total, cashback vouchers accrue a separate
///   amount credited after order completion;
/// - a positive `max_amount` caps percentage and fixed amounts alike;
/// - coin redemption is bounded by the balance and by
///   [`COIN_SUBTOTAL_SHARE`] of the item subtotal.
pub fn compute_totals(
    lines: &[PricedLine],
    courier_price: Decimal,
    service_fee: Decimal,
    voucher: Option<&VoucherTerms>,
    coin_requested: bool,
    buyer_balance: Decimal,
) -> Totals {
    let subtotal: Decimal = lines.iter().map(PricedLine::subtotal).sum();

    let (voucher_discount, voucher_cashback) = match voucher {
        Some(terms) => {
            let amount = voucher_amount(terms, subtotal);
            match terms.kind {
                VoucherKind::Discount => (amount, Decimal::ZERO),
                VoucherKind::Cashback => (Decimal::ZERO, amount),
            }
        }
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    let total = (subtotal + courier_price + service_fee - voucher_discount).max(Decimal::ZERO);

    let coin_applied = if coin_requested {
        buyer_balance
            .min(subtotal * COIN_SUBTOTAL_SHARE)
            .max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    let total_payment = (total - coin_applied).max(Decimal::ZERO);

    Totals {
        subtotal,
        voucher_discount,
        voucher_cashback,
        total,
        coin_applied,
        total_payment,
    }
}

fn voucher_amount(terms: &VoucherTerms, subtotal: Decimal) -> Decimal {
    let raw = match terms.value_type {
        VoucherValueType::Percentage => subtotal * terms.value / Decimal::from(100),
        VoucherValueType::Fixed => terms.value,
    };
    match terms.max_amount {
        Some(cap) if cap > Decimal::ZERO => raw.min(cap),
        _ => raw,
    }
}
