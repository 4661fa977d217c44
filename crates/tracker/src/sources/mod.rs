mod impls;
mod traits;

pub use impls::{AddressBalance, ExplorerListing};
pub use traits::{BalanceSource, PageSource};
