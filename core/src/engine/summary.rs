// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction confirmation report, built during the first pass.
//! Each output leaving the wallet is presented as it is streamed,
//! totals and fee once all outputs are known.

use ledger_utxo_apdu::{tx::Payload, Script};

use crate::{coins::CoinInfo, helpers::fmt_amount};

/// Output destination for display
#[derive(Clone, PartialEq, Debug)]
pub enum ReportTarget {
    /// Destination script_pubkey
    Script(Script),
    /// Null-data payload
    OpReturn(Payload),
}

/// Output requiring user confirmation
#[derive(Clone, PartialEq, Debug)]
pub struct ReportOutput {
    /// Output index in the transaction
    pub index: u32,
    pub amount: u64,
    pub target: ReportTarget,
}

/// Confirmation report
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Report {
    /// Output awaiting confirmation
    pub current: Option<ReportOutput>,
    /// Number of outputs confirmed so far
    pub confirmed: u32,
    /// Sum of input amounts
    pub total_in: u64,
    /// Sum of output amounts
    pub total_out: u64,
    /// Amount returned to the wallet
    pub change_out: u64,
    /// Fee (may be negative for coins permitting this)
    pub fee: i64,
    /// Estimated fee rate per 1000 virtual bytes
    pub fee_per_kb: u64,
    /// Estimated virtual size
    pub vsize: usize,
    /// Fee exceeds the coin threshold
    pub high_fee: bool,
}

impl Report {
    pub const fn new() -> Self {
        Self {
            current: None,
            confirmed: 0,
            total_in: 0,
            total_out: 0,
            change_out: 0,
            fee: 0,
            fee_per_kb: 0,
            vsize: 0,
            high_fee: false,
        }
    }

    /// Present an output for confirmation
    pub fn set_output(&mut self, index: u32, amount: u64, target: ReportTarget) {
        self.current = Some(ReportOutput {
            index,
            amount,
            target,
        });
    }

    /// Mark the current output confirmed
    pub fn confirm_output(&mut self) -> Option<ReportOutput> {
        let o = self.current.take()?;
        self.confirmed += 1;
        Some(o)
    }

    /// Total being spent from the wallet (inputs less change)
    pub fn spending(&self) -> u64 {
        self.total_in.saturating_sub(self.change_out)
    }

    /// Format the total being spent for display
    pub fn fmt_spending<'a>(&self, coin: &CoinInfo, buff: &'a mut [u8]) -> &'a str {
        fmt_amount(self.spending().min(i64::MAX as u64) as i64, coin, buff)
    }

    /// Format the fee for display
    pub fn fmt_fee<'a>(&self, coin: &CoinInfo, buff: &'a mut [u8]) -> &'a str {
        fmt_amount(self.fee, coin, buff)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coins::BITCOIN;

    #[test]
    fn output_confirmation() {
        let mut r = Report::new();
        assert_eq!(r.confirm_output(), None);

        for i in 0..40 {
            r.set_output(i, 1_000, ReportTarget::Script(Script::new()));
            assert_eq!(r.confirm_output().map(|o| o.index), Some(i));
            assert!(r.current.is_none());
        }

        assert_eq!(r.confirmed, 40);
    }

    #[test]
    fn spending_display() {
        let r = Report {
            total_in: 100_000_000,
            total_out: 99_990_000,
            change_out: 49_990_000,
            fee: 10_000,
            ..Default::default()
        };

        let mut buff = [0u8; 32];
        assert_eq!(r.fmt_spending(&BITCOIN, &mut buff), "0.5001 BTC");

        let mut buff = [0u8; 32];
        assert_eq!(r.fmt_fee(&BITCOIN, &mut buff), "0.0001 BTC");
    }
}
