/// Rounds half away from zero to two decimal places.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Tax-exclusive and tax-inclusive amounts, each rounded exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxedAmount {
    pub without_tax: f64,
    pub with_tax: f64,
}

impl TaxedAmount {
    pub fn from_total(total: f64, tax_rate: f64) -> Self {
        let without_tax = round_currency(total);
        let with_tax = round_currency(without_tax * (1.0 + tax_rate));
        Self {
            without_tax,
            with_tax,
        }
    }

    pub fn tax(&self) -> f64 {
        self.with_tax - self.without_tax
    }
}
