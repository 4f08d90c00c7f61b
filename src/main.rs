//! Header store inspector
//!
//! Opens both ring stores under a data directory, reports their heads and
//! archive series, and closes them.
//!
//! Usage: `hdrchain-inspect <data-dir> [config.json]`

use hdrchain::config::{NodeConfig, StoreConfig};
use hdrchain::storage::{BtcBlockStore, ChainFlavor, RingFileStore, VbkBlockStore};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let data_dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => {
            eprintln!("usage: hdrchain-inspect <data-dir> [config.json]");
            std::process::exit(2);
        }
    };
    let mut config = match args.next() {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    config.data_dir = data_dir;

    let btc: BtcBlockStore = open(&config.btc_store_path(), &config.btc_store)?;
    report(&btc)?;
    btc.close()?;

    let vbk: VbkBlockStore = open(&config.vbk_store_path(), &config.vbk_store)?;
    report(&vbk)?;
    vbk.close()?;

    Ok(())
}

fn open<C: ChainFlavor>(
    path: &Path,
    config: &StoreConfig,
) -> Result<RingFileStore<C>, Box<dyn std::error::Error>> {
    Ok(RingFileStore::open(path, config)?)
}

fn report<C: ChainFlavor>(store: &RingFileStore<C>) -> Result<(), Box<dyn std::error::Error>> {
    let series = store.series()?;
    match store.get_chain_head()? {
        Some(head) => info!(
            chain = C::NAME,
            path = %store.path().display(),
            capacity = store.capacity(),
            series,
            head = %head.hash,
            height = head.height,
            work = %head.work,
            "store head"
        ),
        None => info!(
            chain = C::NAME,
            path = %store.path().display(),
            capacity = store.capacity(),
            series,
            "store is empty"
        ),
    }
    Ok(())
}
