mod coingecko;
pub use coingecko::CoinGecko;
