#![no_main]
use std::collections::HashSet;

use cuckoo_digest::{Digest, Filter};
use libfuzzer_sys::arbitrary;
use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::{rngs::SmallRng, SeedableRng};

const FUZZ_REMOVES: bool = true;
const CHECK_EVERY: usize = 8;
/// Primary buckets are folded into this many buckets to force relocations.
const HOT_BUCKETS: u64 = 16;

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    max_kicks: u8,
    ops: Vec<(bool, u64, u16)>,
}

fn digest(fp: u64, bucket: u16) -> Digest {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&fp.to_be_bytes());
    id[8..16].copy_from_slice(&(bucket as u64 % HOT_BUCKETS).to_be_bytes());
    id
}

fuzz_target!(|input: Input| {
    let Input {
        seed,
        max_kicks,
        ops,
    } = input;
    // The "Model", tracks the admitted digests
    let mut admitted = HashSet::new();
    let mut f = Filter::with_rng(SmallRng::seed_from_u64(seed))
        .with_max_insertion_attempts(max_kicks as u32);
    for i in 0..ops.len() {
        let (add, fp, bucket) = ops[i];
        let id = digest(fp, bucket);
        if !FUZZ_REMOVES || add {
            let present = f.contains(&id);
            if f.insert(&id) {
                assert!(!present);
                assert!(admitted.insert(id));
            } else if !present {
                // An exhausted relocation chain may have dropped an admitted fingerprint.
                assert_eq!(f.len(), admitted.len() as u64);
                f.validate();
                return;
            }
        } else if admitted.contains(&id) {
            assert!(f.remove(&id));
            admitted.remove(&id);
        } else {
            continue;
        }

        assert_eq!(f.len(), admitted.len() as u64);
        if i % CHECK_EVERY == 0 {
            for id in &admitted {
                assert!(f.contains(id), "false negative {id:?}");
            }
        }
    }

    f.validate();
    for id in &admitted {
        assert!(f.contains(id), "false negative {id:?}");
    }
    let decoded = Filter::decode(&f.encode()).unwrap();
    assert_eq!(decoded, f);
});
