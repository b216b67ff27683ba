pub mod binance;
pub mod coingecko;
pub mod mock;

pub use binance::BinanceSource;
pub use coingecko::CoinGeckoSource;
pub use mock::MockSource;
