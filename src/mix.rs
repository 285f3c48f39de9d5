/// Robert Jenkins' 32 bit integer hash.
///
/// Used to scatter a fingerprint over the bucket index space when computing
/// its alternate bucket. The output must stay stable across versions and
/// platforms as it determines the persisted layout.
#[inline]
pub(crate) fn jenkins(mut a: u32) -> u32 {
    a = a.wrapping_add(0x7ed55d16).wrapping_add(a << 12);
    a = (a ^ 0xc761c23c) ^ (a >> 19);
    a = a.wrapping_add(0x165667b1).wrapping_add(a << 5);
    a = a.wrapping_add(0xd3a2646c) ^ (a << 9);
    a = a.wrapping_add(0xfd7046c5).wrapping_add(a << 3);
    a = (a ^ 0xb55a4f09) ^ (a >> 16);
    a
}
