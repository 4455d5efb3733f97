//! Plain-text rendering of canonical events for chat delivery.

use crate::events::{
    CanonicalEvent, DepositEvent, FillEvent, FundingEvent, LiquidationEvent, TwapEvent,
    TwapStatus, WithdrawalEvent,
};
use hypertrack_sdk::{Direction, NotificationType, Venue};
use rust_decimal::Decimal;
use time::OffsetDateTime;

const TX_EXPLORER: &str = "https://hypurrscan.io/tx/";

/// Render one message for the given event.
pub fn render(event: &CanonicalEvent) -> String {
    match event {
        CanonicalEvent::Liquidation(e) => render_liquidation(e),
        CanonicalEvent::Fill(e) => render_fill(e),
        CanonicalEvent::Funding(e) => render_funding(e),
        CanonicalEvent::Deposit(e) => render_deposit(e),
        CanonicalEvent::Withdrawal(e) => render_withdrawal(e),
        CanonicalEvent::Twap(e) => render_twap(e),
    }
}

pub fn render_liquidation(e: &LiquidationEvent) -> String {
    let direction = match e.direction {
        Direction::Long => "Long liquidated 🩸",
        Direction::Short => "Short liquidated 💀",
    };
    let mut lines = vec![
        "🚨 LARGE LIQUIDATION".to_string(),
        String::new(),
        format!("Pair: {}", e.pair),
        format!("Direction: {direction}"),
        format!(
            "Size: {} ({})",
            group_thousands(e.size, 4),
            compact_usd(e.notional_usd)
        ),
        format!("Liq Price: ${}", group_thousands(e.price, 2)),
        format!("Venue: {}", e.venue),
    ];
    if let Some(address) = &e.address {
        lines.push(format!("Address: {}", address.short()));
    }
    if let Some(hash) = &e.tx_hash {
        if e.venue == Venue::Hyperliquid {
            lines.push(format!("Tx → {TX_EXPLORER}{hash}"));
        } else {
            lines.push(format!("Tx: {}", shorten(hash, 8)));
        }
    }
    lines.push(String::new());
    lines.push(format!("Time: {}", format_time(e.timestamp)));
    lines.join("\n")
}

pub fn render_fill(e: &FillEvent) -> String {
    let header = match e.kind {
        NotificationType::Liquidation => "🚨 LIQUIDATION",
        NotificationType::Close => "CLOSE POSITION",
        _ => "OPEN POSITION",
    };
    let (side_marker, side) = match e.direction {
        Direction::Long => ("🟩", "Buy"),
        Direction::Short => ("🟥", "Sell"),
    };
    let action = fill_action(e);

    let mut lines = vec![
        header.to_string(),
        format!("Wallet: {} ({})", e.address.short(), e.address),
        String::new(),
        format!("{side_marker} {side} {} - {action}", e.asset),
        format!("💰 Price: {} USDC", group_thousands(e.price, 4)),
        format!(
            "📦 Size: {} {} (${})",
            group_thousands(e.size, 2),
            e.asset,
            group_thousands(e.notional_usd, 2)
        ),
    ];
    if let Some(pnl) = e.closed_pnl.filter(|p| !p.is_zero()) {
        let marker = if pnl.is_sign_positive() { "🤑" } else { "😭" };
        let sign = if pnl.is_sign_positive() { "+" } else { "" };
        let mut line = format!("{marker} Realized PNL: {sign}{} USDC", group_thousands(pnl, 2));
        if !e.notional_usd.is_zero() {
            let pct = pnl / e.notional_usd * Decimal::ONE_HUNDRED;
            line.push_str(&format!(" ({sign}{:.2}%)", pct.round_dp(2)));
        }
        lines.push(line);
    }
    if let Some(fee) = e.fee {
        lines.push(format!("💸 Fee: {} USDC", group_thousands(fee, 4)));
    }
    lines.push(format!("🕒 {}", format_time(e.timestamp)));
    if let Some(hash) = &e.tx_hash {
        lines.push(String::new());
        lines.push(format!("🔗 {TX_EXPLORER}{hash}"));
    }
    lines.join("\n")
}

/// "Open Long", "Partial Close Short", ...
fn fill_action(e: &FillEvent) -> String {
    match &e.action {
        Some(action) if action.contains("Close") => match e.start_position {
            Some(start) if !start.is_zero() => {
                if e.size.abs() >= start.abs() {
                    format!("Full {action}")
                } else {
                    format!("Partial {action}")
                }
            }
            _ => action.to_string(),
        },
        Some(action) => action.to_string(),
        None => {
            let verb = if e.kind == NotificationType::Close {
                "Close"
            } else {
                "Open"
            };
            let side = match e.direction {
                Direction::Long => "Long",
                Direction::Short => "Short",
            };
            format!("{verb} {side}")
        }
    }
}

pub fn render_funding(e: &FundingEvent) -> String {
    let (marker, verb) = if e.amount_usd.is_sign_negative() {
        ("🔻", "Paid")
    } else {
        ("🔺", "Received")
    };
    let side = match e.direction {
        Direction::Long => "Long",
        Direction::Short => "Short",
    };
    [
        "⏱ FUNDING".to_string(),
        format!("Wallet: {} ({})", e.address.short(), e.address),
        String::new(),
        format!("{marker} {verb} {} USDC", group_thousands(e.amount_usd.abs(), 4)),
        format!(
            "Position: {side} {} {} ({})",
            group_thousands(e.position_size.abs(), 4),
            e.asset,
            compact_usd(e.notional_usd)
        ),
        format!("Rate: {}%", (e.funding_rate * Decimal::ONE_HUNDRED).normalize()),
        format!("🕒 {}", format_time(e.timestamp)),
    ]
    .join("\n")
}

pub fn render_deposit(e: &DepositEvent) -> String {
    transfer_message(
        "💰 DEPOSIT",
        &e.address,
        e.amount_usd,
        &e.asset,
        None,
        e.timestamp,
        e.tx_hash.as_deref(),
    )
}

pub fn render_withdrawal(e: &WithdrawalEvent) -> String {
    transfer_message(
        "💸 WITHDRAWAL",
        &e.address,
        e.amount_usd,
        &e.asset,
        e.fee,
        e.timestamp,
        e.tx_hash.as_deref(),
    )
}

pub fn render_twap(e: &TwapEvent) -> String {
    let header = match e.status {
        TwapStatus::Activated => "⏳ TWAP STARTED",
        TwapStatus::Terminated => "⏹ TWAP TERMINATED",
    };
    let (side_marker, side) = match e.direction {
        Direction::Long => ("🟩", "Buy"),
        Direction::Short => ("🟥", "Sell"),
    };
    let mut lines = vec![
        header.to_string(),
        format!("Wallet: {} ({})", e.address.short(), e.address),
        String::new(),
        format!(
            "{side_marker} {side} {} {} over {}m",
            group_thousands(e.size, 4),
            e.asset,
            e.minutes
        ),
    ];
    if !e.executed_size.is_zero() {
        let mut line = format!(
            "📦 Executed: {} {} (${})",
            group_thousands(e.executed_size, 4),
            e.asset,
            group_thousands(e.executed_notional_usd, 2)
        );
        if !e.size.is_zero() {
            let pct = e.executed_size / e.size * Decimal::ONE_HUNDRED;
            line.push_str(&format!(" {:.1}%", pct.round_dp(1)));
        }
        lines.push(line);
    }
    let mut flags = Vec::new();
    if e.reduce_only {
        flags.push("reduce-only");
    }
    if e.randomize {
        flags.push("randomized");
    }
    if !flags.is_empty() {
        lines.push(format!("⚙️ {}", flags.join(", ")));
    }
    lines.push(format!("🕒 {}", format_time(e.timestamp)));
    lines.join("\n")
}

fn transfer_message(
    header: &str,
    address: &hypertrack_sdk::Address,
    amount: Decimal,
    asset: &str,
    fee: Option<Decimal>,
    timestamp: OffsetDateTime,
    tx_hash: Option<&str>,
) -> String {
    let mut lines = vec![
        header.to_string(),
        format!("Wallet: {}", address.short()),
        String::new(),
        format!("Amount: ${} {asset}", group_thousands(amount.abs(), 2)),
    ];
    if let Some(fee) = fee.filter(|f| !f.is_zero()) {
        lines.push(format!("Fee: ${}", group_thousands(fee, 2)));
    }
    lines.push(format!("🕒 {}", format_time(timestamp)));
    if let Some(hash) = tx_hash {
        lines.push(String::new());
        lines.push(format!("Tx → {TX_EXPLORER}{hash}"));
    }
    lines.join("\n")
}

/// `$1.23B`, `$4.50M`, `$45.00K`, `$999.00`.
pub fn compact_usd(amount: Decimal) -> String {
    let thousand = Decimal::from(1_000);
    let million = Decimal::from(1_000_000);
    let billion = Decimal::from(1_000_000_000);
    let (scaled, suffix) = if amount >= billion {
        (amount / billion, "B")
    } else if amount >= million {
        (amount / million, "M")
    } else if amount >= thousand {
        (amount / thousand, "K")
    } else {
        (amount, "")
    };
    format!("${:.2}{suffix}", scaled.round_dp(2))
}

/// Fixed decimal places with `,` between thousands.
pub fn group_thousands(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp(dp);
    let text = format!("{:.*}", dp as usize, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };
    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

/// Keep `keep` characters on each side: `0x1234...cdef`.
fn shorten(value: &str, keep: usize) -> String {
    if value.len() <= keep * 2 + 3 || !value.is_ascii() {
        return value.to_string();
    }
    format!("{}...{}", &value[..keep], &value[value.len() - keep..])
}

fn format_time(ts: OffsetDateTime) -> String {
    let ts = ts.to_offset(time::UtcOffset::UTC);
    format!(
        "{:02}/{:02}/{} {:02}:{:02}:{:02} UTC",
        ts.day(),
        u8::from(ts.month()),
        ts.year(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}
