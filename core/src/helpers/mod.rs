// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::str::from_utf8;

use emstr::{helpers::Fractional, EncodeStr};

use crate::coins::CoinInfo;

/// Maximum supported decimal places, bounded by `i64` scalar range
const MAX_DECIMALS: u8 = 18;

/// Compute the base unit scalar for a coin
fn coin_scalar(coin: &CoinInfo) -> i64 {
    10i64.pow(coin.decimals.min(MAX_DECIMALS) as u32)
}

// Format helper for amounts with the coin shortcut
pub fn fmt_amount<'a>(value: i64, coin: &CoinInfo, buff: &'a mut [u8]) -> &'a str {
    // Compute and write value using scalar
    let mut n = match emstr::write!(&mut buff[..], Fractional::<i64>::new(value, coin_scalar(coin)))
    {
        Ok(v) => v,
        Err(_) => return "ENCODE_ERR",
    };

    // Write coin shortcut
    match emstr::write!(&mut buff[n..], ' ', coin.coin_shortcut) {
        Ok(v) => n += v,
        Err(_) => return "ENCODE_ERR",
    }

    match from_utf8(&buff[..n]) {
        Ok(v) => v,
        Err(_) => "INVALID_UTF8",
    }
}

#[cfg(test)]
mod test {
    use super::fmt_amount;
    use crate::coins::{BITCOIN, PEERCOIN};

    const MAX_LINE_LEN: usize = 20;

    #[test]
    fn fmt_btc() {
        let tests = &[
            (1, "0.00000001 BTC"),
            (10_000, "0.0001 BTC"),
            (99_990_000, "0.9999 BTC"),
            (100_000_000, "1 BTC"),
            (123_456_789, "1.23456789 BTC"),
            (-5_000, "-0.00005 BTC"),
        ];

        for (v, s) in tests {
            let mut buff = [0u8; 32];

            let e = fmt_amount(*v, &BITCOIN, &mut buff);

            assert_eq!(&e, s);
            assert!(
                e.len() <= MAX_LINE_LEN,
                "length {} exceeds line limit {} for {}",
                e.len(),
                MAX_LINE_LEN,
                s
            );
        }
    }

    #[test]
    fn fmt_decimals() {
        let mut buff = [0u8; 32];
        assert_eq!(fmt_amount(1_500_000, &PEERCOIN, &mut buff), "1.5 PPC");
    }
}
