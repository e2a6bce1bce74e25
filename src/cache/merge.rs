// Writes fetched transactions into the cache. Every write is a full replace
// keyed by (address, txid), so merging the same data twice is a no-op.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::transaction::upsert_transactions;
use crate::models::CachedTransaction;

/// Protocol names recognized in `OP_RETURN <name>=...` payloads.
const RECOGNIZED_PROTOCOLS: &[&str] = &["sado", "oip"];

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

/// Stamp ownership and protocol tags, then upsert the batch atomically.
///
/// Returns the number of documents written.
pub async fn merge(
    pool: &SqlitePool,
    address: &str,
    transactions: Vec<CachedTransaction>,
) -> Result<usize, sqlx::Error> {
    if transactions.is_empty() {
        return Ok(0);
    }

    let stamped: Vec<CachedTransaction> = transactions
        .into_iter()
        .map(|mut transaction| {
            transaction.address = address.to_string();
            transaction.protocol = derive_protocol_tag(&transaction).or(transaction.protocol.take());
            transaction
        })
        .collect();

    upsert_transactions(pool, &stamped, Utc::now().timestamp()).await?;
    debug!("Merged {} transactions into {}", stamped.len(), address);

    Ok(stamped.len())
}

/// Name of the first recognized protocol announced by an output script.
pub fn derive_protocol_tag(transaction: &CachedTransaction) -> Option<String> {
    transaction.vout.iter().find_map(|output| {
        let script = &output.script_pub_key;
        op_return_payload(&script.hex)
            .or_else(|| asm_payload(&script.asm))
            .and_then(|payload| protocol_name(&payload))
    })
}

fn op_return_payload(script_hex: &str) -> Option<Vec<u8>> {
    let script = hex::decode(script_hex).ok()?;
    let (&opcode, rest) = script.split_first()?;
    if opcode != OP_RETURN {
        return None;
    }

    let (&push, rest) = rest.split_first()?;
    let (len, data) = match push {
        0x01..=0x4b => (push as usize, rest),
        OP_PUSHDATA1 => {
            let (&len, data) = rest.split_first()?;
            (len as usize, data)
        }
        OP_PUSHDATA2 => {
            let len = rest.get(..2)?;
            (u16::from_le_bytes([len[0], len[1]]) as usize, &rest[2..])
        }
        _ => return None,
    };

    data.get(..len).map(<[u8]>::to_vec)
}

// Some explorers only return the disassembly: "OP_RETURN <hex>"
fn asm_payload(asm: &str) -> Option<Vec<u8>> {
    let mut parts = asm.split_whitespace();
    if parts.next()? != "OP_RETURN" {
        return None;
    }
    hex::decode(parts.next()?).ok()
}

fn protocol_name(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?;
    let (name, _) = text.split_once('=')?;
    RECOGNIZED_PROTOCOLS
        .contains(&name)
        .then(|| name.to_string())
}
