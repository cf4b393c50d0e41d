use std::borrow::Borrow;

use askama;


/// Two decimals with thousands separators, e.g. `1,234.50`.
pub(crate) fn money<N: Borrow<f64>>(amount: N) -> askama::Result<String> {
    let amount = *amount.borrow();
    let plain = format!("{:.2}", amount.abs());
    let (whole, cents) = plain.split_at(plain.len() - 3);

    let mut grouped = String::with_capacity(plain.len() + whole.len() / 3 + 1);
    if amount < 0.0 && plain != "0.00" {
        grouped.push('-');
    }
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped.push_str(cents);
    Ok(grouped)
}
