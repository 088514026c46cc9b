//! Query planning and execution.
//!
//! Planning picks, for every filter, the applicable index with the
//! first name in order, deterministic across runs. Execution fans one
//! worker per filter over a single read snapshot, collects the partial
//! id sets over a channel, intersects them, applies ordering and the
//! paging window, and materializes payloads from the same snapshot.
//!
//! Every worker observes the query deadline and the close flag; a
//! query that runs out of time returns [`Error::Timeout`] with no
//! partial results.

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterOperator, Query, QueryResponse};
use crate::idset::IdSet;
use crate::index::{Index, RangeScan};
use crate::layout;
use nestdb_codec::encode_as;
use nestdb_kv::ReadTx;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

pub(crate) fn execute(collection: &Collection, query: &Query) -> Result<QueryResponse> {
    if collection.closing_flag().load(Ordering::Relaxed) {
        return Err(Error::Canceled);
    }

    let span = tracing::debug_span!("query", collection = %collection.name());
    let _guard = span.enter();

    let deadline = Instant::now()
        + query
            .timeout_value()
            .unwrap_or(collection.options().query_timeout);
    let scan_limit = collection.options().internal_query_limit;

    let indexes = collection.index_registry().read();

    // Plan: one index per filter, or an unsatisfiable query.
    let mut plan: Vec<(&Filter, &Index)> = Vec::with_capacity(query.filters().len());
    for filter in query.filters() {
        let chosen = indexes
            .iter()
            .filter(|index| index.does_filter_apply(filter))
            .min_by(|a, b| a.name().cmp(b.name()));
        match chosen {
            Some(index) => plan.push((filter, index)),
            None => {
                tracing::debug!(
                    selector = %filter.selector(),
                    "no index serves this filter; query is unsatisfiable"
                );
                return Ok(QueryResponse::new(Vec::new(), false));
            }
        }
    }
    if plan.is_empty() {
        return Ok(QueryResponse::new(Vec::new(), false));
    }

    let tx = collection.engine().begin_read()?;
    let closing = collection.closing_flag();
    let abort = AtomicBool::new(false);

    // One worker per filter, one collector on this thread.
    let collected = thread::scope(|scope| -> Result<IdSet> {
        let (sender, receiver) = mpsc::channel::<Result<IdSet>>();
        for (filter, index) in plan.iter().copied() {
            let sender = sender.clone();
            let tx_ref = &*tx;
            let abort_ref = &abort;
            scope.spawn(move || {
                let result =
                    run_filter(index, filter, tx_ref, scan_limit, deadline, closing, abort_ref);
                let _ = sender.send(result);
            });
        }
        drop(sender);

        let mut acc: Option<IdSet> = None;
        for _ in 0..plan.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok(Ok(set)) => {
                    acc = Some(match acc.take() {
                        Some(prev) => prev.intersect(set),
                        None => set,
                    });
                }
                Ok(Err(err)) => {
                    abort.store(true, Ordering::Relaxed);
                    return Err(err);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    abort.store(true, Ordering::Relaxed);
                    return Err(Error::Timeout);
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(Error::Canceled);
                }
            }
        }
        Ok(acc.unwrap_or_default())
    });
    let mut set = collected?;

    // Ordering: reuse annotations when a participating index already
    // carries the order selector; otherwise one extra bounded scan.
    if let Some(order_selector) = query.order() {
        let order_hash = order_selector.hash();
        let annotated = plan
            .iter()
            .any(|(_, index)| index.selector_hash() == order_hash);
        if !annotated && !set.is_empty() {
            let order_index = indexes
                .iter()
                .filter(|index| index.selector_hash() == order_hash)
                .min_by(|a, b| a.name().cmp(b.name()));
            match order_index {
                Some(index) => {
                    let scan = index.lookup_range(
                        &*tx,
                        RangeScan {
                            limit: scan_limit,
                            deadline: Some(deadline),
                            cancel: Some(closing),
                            ..RangeScan::full(scan_limit)
                        },
                    )?;
                    if scan.truncated() {
                        set.mark_truncated();
                    }
                    set.annotate_from(&scan, order_hash);
                }
                None => {
                    tracing::warn!(
                        selector = %order_selector,
                        "order selector has no index; ordering unenforced"
                    );
                }
            }
        }
        set.order_by(order_hash, query.ascending());
    }

    set.paginate(query.offset_value(), query.limit_value());

    if set.is_empty() {
        return Ok(QueryResponse::new(Vec::new(), set.truncated()));
    }
    if Instant::now() >= deadline {
        return Err(Error::Timeout);
    }

    // Materialize from the same snapshot the workers read.
    let records_name = layout::records_bucket(collection.name());
    let bucket = tx
        .bucket(&records_name)
        .ok_or_else(|| Error::corruption(format!("records bucket {records_name} missing")))?;
    let mut entries = Vec::with_capacity(set.len());
    for entry in set.entries() {
        let payload = bucket.get(entry.id.as_bytes()).ok_or_else(|| {
            Error::corruption(format!("index entry references missing record {}", entry.id))
        })?;
        entries.push((entry.id.clone(), payload));
    }

    tracing::debug!(
        results = entries.len(),
        truncated = set.truncated(),
        "query complete"
    );
    Ok(QueryResponse::new(entries, set.truncated()))
}

fn run_filter(
    index: &Index,
    filter: &Filter,
    tx: &(dyn ReadTx + Send + Sync),
    scan_limit: usize,
    deadline: Instant,
    closing: &AtomicBool,
    abort: &AtomicBool,
) -> Result<IdSet> {
    if closing.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed) {
        return Err(Error::Canceled);
    }
    if Instant::now() >= deadline {
        return Err(Error::Timeout);
    }

    match filter.operator() {
        FilterOperator::Equal => {
            let mut set = IdSet::new();
            for value in filter.values() {
                let encoded = encode_as(index.kind(), value)?;
                set.union(index.lookup_equal(tx, &encoded)?);
            }
            Ok(set)
        }
        FilterOperator::Greater | FilterOperator::Less => {
            let Some(value) = filter.values().first() else {
                return Ok(IdSet::new());
            };
            let encoded = encode_as(index.kind(), value)?;
            index.lookup_range(
                tx,
                RangeScan {
                    from: Some(&encoded),
                    to: None,
                    inclusive: filter.equal(),
                    ascending: filter.operator() == FilterOperator::Greater,
                    limit: scan_limit,
                    deadline: Some(deadline),
                    cancel: Some(closing),
                    abort: Some(abort),
                },
            )
        }
        FilterOperator::Between => {
            if filter.values().len() < 2 {
                return Ok(IdSet::new());
            }
            let low = encode_as(index.kind(), &filter.values()[0])?;
            let high = encode_as(index.kind(), &filter.values()[1])?;
            index.lookup_range(
                tx,
                RangeScan {
                    from: Some(&low),
                    to: Some(&high),
                    inclusive: filter.equal(),
                    ascending: true,
                    limit: scan_limit,
                    deadline: Some(deadline),
                    cancel: Some(closing),
                    abort: Some(abort),
                },
            )
        }
    }
}
