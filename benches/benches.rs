#![feature(test)]
extern crate test;

use cuckoo_digest::*;
use sha2::{Digest as _, Sha256};
use test::Bencher;

fn samples(n: u64) -> Vec<Digest> {
    (0..n).map(|i| Sha256::digest(i.to_le_bytes()).into()).collect()
}

fn filled(n: u64) -> (Filter, Vec<Digest>) {
    let ids = samples(n);
    let mut f = Filter::new();
    for id in &ids {
        f.insert(id);
    }
    (f, ids)
}

#[bench]
fn bench_new(b: &mut Bencher) {
    b.iter(Filter::new);
}

#[bench]
fn bench_insert(b: &mut Bencher) {
    let ids = samples(100_000);
    let mut f = Filter::new();
    let mut i = 0;
    b.iter(|| {
        i += 1;
        f.insert(&ids[i % ids.len()])
    })
}

#[bench]
fn bench_insert_90pct(b: &mut Bencher) {
    let n = ENCODED_SIZE as u64 / 10 * 9;
    let (f, _) = filled(n);
    let extra = (n..n + 1000)
        .map(|i| Sha256::digest(i.to_le_bytes()).into())
        .collect::<Vec<Digest>>();
    b.iter(|| {
        let mut f = f.clone();
        for id in &extra {
            f.insert(id);
        }
        f
    });
}

#[bench]
fn bench_get_ok(b: &mut Bencher) {
    let (f, ids) = filled(100_000);
    let mut i = 0;
    b.iter(|| {
        i += 1;
        f.contains(&ids[i % ids.len()])
    })
}

#[bench]
fn bench_get_nok(b: &mut Bencher) {
    let (f, _) = filled(100_000);
    let misses = samples(200_000).split_off(100_000);
    let mut i = 0;
    b.iter(|| {
        i += 1;
        f.contains(&misses[i % misses.len()])
    })
}

#[bench]
fn bench_encode(b: &mut Bencher) {
    let (f, _) = filled(100_000);
    b.iter(|| f.encode());
}

#[bench]
fn bench_decode(b: &mut Bencher) {
    let bytes = filled(100_000).0.encode();
    b.iter(|| Filter::decode(&bytes).unwrap());
}

#[bench]
fn bench_decode_view(b: &mut Bencher) {
    let bytes = filled(100_000).0.encode();
    b.iter(|| FilterView::decode(&bytes).unwrap().contains(&[0; 32]));
}
