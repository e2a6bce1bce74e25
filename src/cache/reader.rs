// Local-only paginated reads. Windows are cut on block height boundaries and
// the returned options carry the cursor for the neighbouring windows.

use futures::TryStreamExt;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::transaction::{
    nearest_height_at_or_after, nearest_height_at_or_before, scan_transactions, HeightRange,
};
use crate::models::{CachedTransaction, TransactionPage};
use crate::options::{Bound, FetchOptions, PageOptions};

pub async fn read(
    pool: &SqlitePool,
    address: &str,
    options: FetchOptions,
) -> Result<TransactionPage, sqlx::Error> {
    let range = HeightRange {
        before: options.has_before().then_some(options.before),
        after: options.has_after().then_some(options.after),
    };

    let mut window: Vec<CachedTransaction> = Vec::new();
    {
        let mut rows = scan_transactions(pool, address, range);
        let mut boundary: Option<Option<i64>> = None;

        while let Some(transaction) = rows.try_next().await? {
            if window.len() as i64 >= options.limit && boundary != Some(transaction.blockheight) {
                break;
            }
            boundary = Some(transaction.blockheight);
            window.push(transaction);
        }
    }

    let (before, after) = next_cursor(pool, address, range, &window).await?;

    debug!(
        "Read {} transactions of {} (range {:?}), next before {:?} after {:?}",
        window.len(),
        address,
        range,
        before,
        after
    );

    let transactions = window
        .into_iter()
        .map(|transaction| project(transaction, &options))
        .collect();

    Ok(TransactionPage {
        transactions,
        options: PageOptions::new(options, before, after),
    })
}

async fn next_cursor(
    pool: &SqlitePool,
    address: &str,
    range: HeightRange,
    window: &[CachedTransaction],
) -> Result<(Bound, Bound), sqlx::Error> {
    if window.is_empty() {
        let before = match range.after {
            Some(after) => nearest_height_at_or_before(pool, address, after - 1).await?,
            None => None,
        };
        let after = match range.before {
            Some(before) => match before.checked_add(1) {
                Some(above) => nearest_height_at_or_after(pool, address, above).await?,
                None => None,
            },
            None => None,
        };
        return Ok((before.into(), after.into()));
    }

    let heights = window.iter().filter_map(|tx| tx.blockheight);
    let lowest = heights.clone().min();
    let highest = heights.max();

    // Unconfirmed records sort above every height
    let below = lowest.map_or(i64::MAX, |lowest| lowest - 1);
    let before = nearest_height_at_or_before(pool, address, below).await?;

    let after = match highest {
        Some(highest) if window.iter().all(CachedTransaction::is_confirmed) => match highest.checked_add(1) {
            Some(above) => nearest_height_at_or_after(pool, address, above).await?,
            None => None,
        },
        _ => None,
    };

    Ok((before.into(), after.into()))
}

fn project(mut transaction: CachedTransaction, options: &FetchOptions) -> CachedTransaction {
    if !options.include_ordinal_data {
        for output in &mut transaction.vout {
            output.ordinals = None;
            output.inscriptions = None;
        }
    }
    if options.omit_hex {
        transaction.hex = None;
    }
    if options.omit_witness {
        for input in &mut transaction.vin {
            input.txinwitness = None;
        }
    }
    transaction
}
