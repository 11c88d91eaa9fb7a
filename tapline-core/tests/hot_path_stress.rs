//! Cross-component stress: pool blocks travelling through the MPMC ring
//!
//! Hammers the exact ownership pattern the pipeline relies on: producers
//! acquire blocks, write a payload, and push handles; consumers pop, verify
//! the payload, and release. Multiset equality across threads proves no
//! block is lost, duplicated, or torn in transit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tapline_core::pool::BlockPool;
use tapline_core::queue::MpmcQueue;

struct TaggedBlock {
    block: tapline_core::pool::BlockHandle,
    tag: u64,
}

#[test]
fn test_blocks_survive_mpmc_transit_intact() {
    const PRODUCERS: u64 = 3;
    const CONSUMERS: usize = 2;
    const ITEMS_PER_PRODUCER: u64 = 20_000;

    let pool = Arc::new(BlockPool::new(512 * 1024, 1024, false).unwrap());
    let queue: Arc<MpmcQueue<TaggedBlock>> = Arc::new(MpmcQueue::with_capacity(256));
    let done = Arc::new(AtomicBool::new(false));
    let received: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let mut threads = Vec::new();
    for producer in 0..PRODUCERS {
        let pool = Arc::clone(&pool);
        let queue = Arc::clone(&queue);
        threads.push(std::thread::spawn(move || {
            for i in 0..ITEMS_PER_PRODUCER {
                let tag = producer * ITEMS_PER_PRODUCER + i;
                // Acquire may transiently fail while consumers lag.
                let mut block = loop {
                    match pool.acquire() {
                        Some(block) => break block,
                        None => std::thread::yield_now(),
                    }
                };
                block.as_mut_slice()[..8].copy_from_slice(&tag.to_le_bytes());

                let mut item = TaggedBlock { block, tag };
                loop {
                    match queue.try_push(item) {
                        Ok(()) => break,
                        Err(back) => {
                            item = back;
                            std::thread::yield_now();
                        }
                    }
                }
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let pool = Arc::clone(&pool);
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        let received = Arc::clone(&received);
        consumers.push(std::thread::spawn(move || {
            let mut local = Vec::new();
            loop {
                match queue.try_pop() {
                    Some(item) => {
                        let mut tag_bytes = [0u8; 8];
                        tag_bytes.copy_from_slice(&item.block.as_slice()[..8]);
                        // Payload must match the tag that travelled with it.
                        assert_eq!(u64::from_le_bytes(tag_bytes), item.tag);
                        local.push(item.tag);
                        pool.release(item.block);
                    }
                    None => {
                        if done.load(Ordering::Acquire) && queue.try_pop().is_none() {
                            break;
                        }
                        std::thread::yield_now();
                    }
                }
            }
            received.lock().unwrap().extend(local);
        }));
    }

    for thread in threads {
        thread.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for consumer in consumers {
        consumer.join().unwrap();
    }

    let received = received.lock().unwrap();
    assert_eq!(received.len() as u64, PRODUCERS * ITEMS_PER_PRODUCER);
    let unique: HashSet<_> = received.iter().collect();
    assert_eq!(unique.len(), received.len(), "duplicate block delivery");

    let stats = pool.stats();
    assert_eq!(stats.allocated, 0, "blocks leaked under stress");
    assert_eq!(stats.total_allocations, stats.total_deallocations);
    assert_eq!(stats.contract_violations, 0);

    let qstats = queue.stats();
    assert_eq!(qstats.enqueued, qstats.dequeued);
    assert_eq!(qstats.enqueued, PRODUCERS * ITEMS_PER_PRODUCER);
}

#[test]
fn test_pool_invariants_under_random_interleaving() {
    use rand::Rng;

    let pool = BlockPool::new(64 * 1024, 1024, false).unwrap();
    let mut rng = rand::thread_rng();
    let mut held = Vec::new();

    for _ in 0..100_000 {
        if held.is_empty() || (held.len() < 64 && rng.gen_bool(0.5)) {
            if let Some(handle) = pool.acquire() {
                held.push(handle);
            }
        } else {
            let index = rng.gen_range(0..held.len());
            pool.release(held.swap_remove(index));
        }

        let stats = pool.stats();
        assert_eq!(stats.allocated + stats.free, stats.capacity);
        assert_eq!(stats.allocated as usize, held.len());
    }

    for handle in held.drain(..) {
        pool.release(handle);
    }
    let stats = pool.stats();
    assert_eq!(stats.allocated, 0);
    assert_eq!(stats.total_allocations, stats.total_deallocations);
}
