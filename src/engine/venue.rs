// FEEDGATE — ENGINE: VENUE STRATEGY
// One enum carries everything venue-specific: the TLS-443 WebSocket endpoint,
// the trust policy (webpki roots for real venues, accept-any for the mock
// servers), the subscribe frame emitted on establishment, and the portfolio
// symbol tables. Mock venues push unsolicited and take no subscribe frame.

use serde_json::json;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Venue {
    Bitmex,
    BitmexTestnet,
    Kraken,
    MockBitmex,
    MockKraken,
}

/// TLS trust policy for a venue endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TlsTrust {
    /// Full chain + hostname verification against the webpki root store.
    Verified,
    /// Self-signed allowed, hostname check skipped. Mock endpoints only.
    TrustAny,
}

pub struct Endpoint {
    pub host: &'static str,
    pub port: u16,
    pub path: &'static str,
}

impl Venue {
    pub fn parse(s: &str) -> Option<Venue> {
        match s {
            "bitmex" => Some(Venue::Bitmex),
            "bitmex-testnet" => Some(Venue::BitmexTestnet),
            "kraken" => Some(Venue::Kraken),
            "mock-bitmex" => Some(Venue::MockBitmex),
            "mock-kraken" => Some(Venue::MockKraken),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Venue::Bitmex => "bitmex",
            Venue::BitmexTestnet => "bitmex-testnet",
            Venue::Kraken => "kraken",
            Venue::MockBitmex => "mock-bitmex",
            Venue::MockKraken => "mock-kraken",
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Venue::Bitmex => Endpoint { host: "ws.bitmex.com", port: 443, path: "/realtime" },
            Venue::BitmexTestnet => Endpoint { host: "testnet.bitmex.com", port: 443, path: "/realtime" },
            Venue::Kraken => Endpoint { host: "ws.kraken.com", port: 443, path: "/v2" },
            Venue::MockBitmex | Venue::MockKraken => Endpoint { host: "127.0.0.1", port: 7681, path: "/" },
        }
    }

    pub fn trust(&self) -> TlsTrust {
        match self {
            Venue::MockBitmex | Venue::MockKraken => TlsTrust::TrustAny,
            _ => TlsTrust::Verified,
        }
    }

    /// The text frame emitted once on WebSocket establishment, one symbol per
    /// connection. Mock servers push unsolicited — no frame.
    pub fn subscribe_frame(&self, symbol: &str) -> Option<String> {
        match self {
            Venue::Bitmex | Venue::BitmexTestnet => Some(
                json!({
                    "op": "subscribe",
                    "args": [format!("orderBookL2_25:{symbol}")],
                })
                .to_string(),
            ),
            Venue::Kraken => Some(
                json!({
                    "method": "subscribe",
                    "params": {
                        "channel": "book",
                        "depth": 10,
                        "snapshot": true,
                        "symbol": [symbol],
                    },
                    "req_id": 1234567890u64,
                })
                .to_string(),
            ),
            Venue::MockBitmex | Venue::MockKraken => None,
        }
    }

    /// Symbol table for a portfolio size. One connection per symbol; the
    /// connection count is the table length. BitMEX carries a single fixed
    /// triple; Kraken books come in the 3/50/92/122 portfolio editions.
    pub fn portfolio(&self, size: usize) -> Option<&'static [&'static str]> {
        match self {
            Venue::Bitmex | Venue::BitmexTestnet | Venue::MockBitmex => match size {
                3 => Some(&BITMEX_PAIRS),
                _ => None,
            },
            Venue::Kraken | Venue::MockKraken => match size {
                3 => Some(&KRAKEN_PORTFOLIO_3),
                50 => Some(&KRAKEN_PORTFOLIO_50),
                92 => Some(&KRAKEN_PORTFOLIO_92),
                122 => Some(&KRAKEN_PORTFOLIO_122),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmex_subscribe_frame_shape() {
        let frame = Venue::Bitmex.subscribe_frame("XBTUSDT").unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["op"], "subscribe");
        assert_eq!(v["args"][0], "orderBookL2_25:XBTUSDT");
    }

    #[test]
    fn kraken_subscribe_frame_shape() {
        let frame = Venue::Kraken.subscribe_frame("USDT/USD").unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["method"], "subscribe");
        assert_eq!(v["params"]["channel"], "book");
        assert_eq!(v["params"]["depth"], 10);
        assert_eq!(v["params"]["snapshot"], true);
        assert_eq!(v["params"]["symbol"][0], "USDT/USD");
        assert_eq!(v["req_id"], 1234567890u64);
    }

    #[test]
    fn mock_venues_send_no_frame() {
        assert!(Venue::MockBitmex.subscribe_frame("XBTUSDT").is_none());
        assert!(Venue::MockKraken.subscribe_frame("USDT/USD").is_none());
    }

    #[test]
    fn venue_parse_round_trip() {
        for v in [Venue::Bitmex, Venue::BitmexTestnet, Venue::Kraken, Venue::MockBitmex, Venue::MockKraken] {
            assert_eq!(Venue::parse(v.label()), Some(v));
        }
        assert_eq!(Venue::parse("coinbase"), None);
    }

    #[test]
    fn portfolio_tables() {
        assert_eq!(Venue::Kraken.portfolio(3).unwrap().len(), 3);
        assert_eq!(Venue::Kraken.portfolio(50).unwrap().len(), 50);
        // The venue's "92" and "122" portfolio editions dedupe to 85 and 115 books.
        assert_eq!(Venue::Kraken.portfolio(92).unwrap().len(), 85);
        assert_eq!(Venue::Kraken.portfolio(122).unwrap().len(), 115);
        assert!(Venue::Kraken.portfolio(7).is_none());
        assert_eq!(Venue::Bitmex.portfolio(3).unwrap(), &["XBTUSDT", "XBTETH", "ETHUSDT"]);
        assert!(Venue::Bitmex.portfolio(50).is_none());
    }
}

// ============================================================================
// PORTFOLIO TABLES
// ============================================================================

pub static BITMEX_PAIRS: [&str; 3] = ["XBTUSDT", "XBTETH", "ETHUSDT"];

pub static KRAKEN_PORTFOLIO_3: [&str; 3] = ["USDT/USD", "SOL/USDT", "SOL/USD"];
pub static KRAKEN_PORTFOLIO_122: [&str; 115] = [
    "KSM/EUR","KSM/BTC","KSM/DOT","KSM/GBP","KSM/ETH","KSM/USD","GBP/USD","BTC/CAD",
    "BTC/EUR","BTC/AUD","BTC/JPY","BTC/GBP","BTC/CHF","BTC/USDT","BTC/USD","BTC/USDC",
    "LTC/EUR","LTC/BTC","LTC/AUD","LTC/JPY","LTC/GBP","LTC/ETH","LTC/USDT","LTC/USD",
    "SOL/EUR","SOL/BTC","SOL/GBP","SOL/ETH","SOL/USDT","SOL/USD","DOT/EUR","DOT/BTC",
    "DOT/JPY","DOT/GBP","DOT/ETH","DOT/USDT","DOT/USD","ETH/CAD","ETH/EUR","ETH/BTC",
    "ETH/AUD","ETH/JPY","ETH/GBP","ETH/CHF","ETH/USDT","ETH/USD","ETH/USDC","LINK/EUR",
    "LINK/BTC","LINK/AUD","LINK/JPY","LINK/GBP","LINK/ETH","LINK/USDT","LINK/USD","USDC/CAD",
    "USDC/EUR","USDC/AUD","USDC/GBP","USDC/CHF","USDC/USDT","USDC/USD","ADA/EUR","ADA/BTC",
    "ADA/AUD","ADA/GBP","ADA/ETH","ADA/USDT","ADA/USD","ATOM/EUR","ATOM/BTC","ATOM/GBP",
    "ATOM/ETH","ATOM/USDT","ATOM/USD","USDT/EUR","USDT/AUD","USDT/JPY","USDT/GBP","USDT/CHF",
    "USDT/USD","USDT/CAD","AUD/JPY","AUD/USD","XRP/CAD","XRP/EUR","XRP/BTC","XRP/AUD",
    "XRP/GBP","XRP/ETH","XRP/USDT","XRP/USD","EUR/CAD","EUR/AUD","EUR/JPY","EUR/GBP",
    "EUR/CHF","EUR/USD","BCH/EUR","BCH/BTC","BCH/AUD","BCH/JPY","BCH/GBP","BCH/ETH",
    "BCH/USDT","BCH/USD","USD/CHF","USD/JPY","USD/CAD","ALGO/EUR","ALGO/BTC","ALGO/GBP",
    "ALGO/ETH","ALGO/USDT","ALGO/USD",
];

pub static KRAKEN_PORTFOLIO_92: [&str; 85] = [
    "BCH/USD","BCH/BTC","BCH/EUR","BCH/AUD","BCH/GBP","BCH/ETH","BCH/USDT","BCH/JPY",
    "BTC/USD","BTC/EUR","BTC/USDC","BTC/AUD","BTC/GBP","BTC/CAD","BTC/USDT","BTC/JPY",
    "USD/CAD","USD/JPY","XRP/USD","XRP/BTC","XRP/EUR","XRP/AUD","XRP/GBP","XRP/ETH",
    "XRP/CAD","XRP/USDT","EUR/USD","EUR/AUD","EUR/GBP","EUR/CAD","EUR/JPY","LTC/USD",
    "LTC/EUR","LTC/BTC","LTC/AUD","LTC/GBP","LTC/ETH","LTC/USDT","LTC/JPY","ETH/USD",
    "ETH/EUR","ETH/BTC","ETH/USDC","ETH/AUD","ETH/GBP","ETH/CAD","ETH/USDT","ETH/JPY",
    "LINK/USD","LINK/BTC","LINK/EUR","LINK/AUD","LINK/GBP","LINK/ETH","LINK/USDT","LINK/JPY",
    "ADA/USD","ADA/BTC","ADA/EUR","ADA/AUD","ADA/GBP","ADA/ETH","ADA/USDT","USDC/USD",
    "USDC/EUR","USDC/AUD","USDC/GBP","USDC/CAD","USDC/USDT","GBP/USD","DOT/USD","DOT/BTC",
    "DOT/EUR","DOT/GBP","DOT/ETH","DOT/USDT","DOT/JPY","USDT/USD","USDT/EUR","USDT/AUD",
    "USDT/GBP","USDT/CAD","USDT/JPY","AUD/USD","AUD/JPY",
];

pub static KRAKEN_PORTFOLIO_50: [&str; 50] = [
    "BCH/JPY","BCH/ETH","BCH/GBP","BCH/AUD","BCH/BTC","BCH/USDT","BCH/EUR","BCH/USD",
    "USDT/JPY","USDT/GBP","USDT/AUD","USDT/EUR","USDT/USD","BTC/JPY","BTC/GBP","BTC/AUD",
    "BTC/USDT","BTC/EUR","BTC/USD","EUR/GBP","EUR/JPY","EUR/AUD","EUR/USD","ETH/JPY",
    "ETH/EUR","ETH/AUD","ETH/BTC","ETH/USDT","ETH/GBP","ETH/USD","USD/JPY","LINK/JPY",
    "LINK/ETH","LINK/EUR","LINK/AUD","LINK/BTC","LINK/USDT","LINK/GBP","LINK/USD","LTC/JPY",
    "LTC/ETH","LTC/GBP","LTC/AUD","LTC/BTC","LTC/USDT","LTC/EUR","LTC/USD","GBP/USD",
    "AUD/JPY","AUD/USD",
];

