#![no_main]
use cuckoo_digest::{Filter, FilterView};
use libfuzzer_sys::fuzz_target;
use rand::{rngs::SmallRng, SeedableRng};

fuzz_target!(|data: Vec<[u8; 32]>| {
    let mut f = Filter::with_rng(SmallRng::seed_from_u64(0));
    let mut buf = f.encode();
    let mut view = FilterView::decode_mut_with_rng(&mut buf, SmallRng::seed_from_u64(0)).unwrap();
    // Same operations with the same random source must produce the same layout.
    for (i, id) in data.iter().enumerate() {
        if i % 3 == 2 {
            assert_eq!(f.remove(id), view.remove(id));
        } else {
            assert_eq!(f.insert(id), view.insert(id));
        }
        assert_eq!(f.contains(id), view.contains(id));
    }
    drop(view);
    assert_eq!(f.as_bytes(), &buf[..]);

    let view = FilterView::decode(&buf).unwrap();
    for id in &data {
        assert_eq!(f.contains(id), view.contains(id));
    }
    assert_eq!(Filter::decode(&buf).unwrap(), f);
});
