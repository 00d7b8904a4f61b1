//! Length-limited Huffman code construction.

/// Maximum code length for the main alphabets (RFC 7932)
pub const MAX_HUFFMAN_BITS: usize = 16;

/// Maximum depth of a literal/command/distance code
pub const MAX_CODE_DEPTH: u8 = 15;

/// Maximum depth of the code-length code
pub const MAX_CODE_LENGTH_CODE_DEPTH: u8 = 5;

/// One node of the tree pool used by [`create_huffman_tree`]
///
/// Leaves have `index_left == -1` and store their symbol in
/// `index_right_or_value`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HuffmanTree {
    pub total_count: u32,
    pub index_left: i16,
    pub index_right_or_value: i16,
}

impl HuffmanTree {
    #[inline]
    pub fn new(total_count: u32, left: i16, right: i16) -> Self {
        Self { total_count, index_left: left, index_right_or_value: right }
    }

    const SENTINEL: HuffmanTree = HuffmanTree { total_count: u32::MAX, index_left: -1, index_right_or_value: -1 };
}

/// Ordering used when seeding the two-queue merge: ascending count, then
/// descending symbol.
#[inline]
fn sort_key(a: &HuffmanTree, b: &HuffmanTree) -> std::cmp::Ordering {
    a.total_count
        .cmp(&b.total_count)
        .then_with(|| b.index_right_or_value.cmp(&a.index_right_or_value))
}

/// Walk the tree rooted at `root` and assign depths to leaves
///
/// Returns false if any leaf lands deeper than `max_depth`.
fn set_depth(root: usize, pool: &[HuffmanTree], depth: &mut [u8], max_depth: usize) -> bool {
    let mut stack = [-1i32; 16];
    let mut level: i32 = 0;
    let mut p = root;
    loop {
        let node = pool[p];
        if node.index_left >= 0 {
            level += 1;
            if level as usize > max_depth {
                return false;
            }
            stack[level as usize] = node.index_right_or_value as i32;
            p = node.index_left as usize;
            continue;
        }
        depth[node.index_right_or_value as usize] = level as u8;

        while level >= 0 && stack[level as usize] == -1 {
            level -= 1;
        }
        if level < 0 {
            return true;
        }
        p = stack[level as usize] as usize;
        stack[level as usize] = -1;
    }
}

/// Build a Huffman tree for `data` with depth limit `tree_limit`
///
/// Writes the depth of every used symbol into `depth`. When the plain tree
/// is too deep, small counts are clamped up to a doubling `count_limit`
/// and the tree is rebuilt, which flattens it. `pool` is scratch space; its
/// previous contents are discarded.
pub fn create_huffman_tree(data: &[u32], tree_limit: u8, pool: &mut Vec<HuffmanTree>, depth: &mut [u8]) {
    debug_assert!(depth.len() >= data.len());
    pool.clear();
    pool.resize(2 * data.len() + 1, HuffmanTree::default());

    let mut count_limit: u32 = 1;
    loop {
        let mut n = 0usize;
        for i in (0..data.len()).rev() {
            if data[i] != 0 {
                let count = data[i].max(count_limit);
                pool[n] = HuffmanTree::new(count, -1, i as i16);
                n += 1;
            }
        }

        if n == 0 {
            return;
        }
        if n == 1 {
            depth[pool[0].index_right_or_value as usize] = 1;
            return;
        }

        pool[..n].sort_by(sort_key);

        // Leaves occupy [0, n), internal nodes grow from n + 1; each queue is
        // terminated by a sentinel so the merge never needs bounds checks.
        pool[n] = HuffmanTree::SENTINEL;
        pool[n + 1] = HuffmanTree::SENTINEL;

        let mut i = 0usize;
        let mut j = n + 1;
        for k in (1..n).rev() {
            let left = if pool[i].total_count <= pool[j].total_count {
                i += 1;
                i - 1
            } else {
                j += 1;
                j - 1
            };
            let right = if pool[i].total_count <= pool[j].total_count {
                i += 1;
                i - 1
            } else {
                j += 1;
                j - 1
            };

            let j_end = 2 * n - k;
            pool[j_end].total_count = pool[left].total_count.saturating_add(pool[right].total_count);
            pool[j_end].index_left = left as i16;
            pool[j_end].index_right_or_value = right as i16;
            pool[j_end + 1] = HuffmanTree::SENTINEL;
        }

        if set_depth(2 * n - 1, pool, depth, tree_limit as usize) {
            return;
        }
        count_limit = count_limit.saturating_mul(2);
    }
}

/// Reverse the bottom `num_bits` bits of `bits`
#[inline]
pub fn reverse_bits(num_bits: u8, bits: u16) -> u16 {
    let mut result = 0u16;
    let mut v = bits;
    for _ in 0..num_bits {
        result = (result << 1) | (v & 1);
        v >>= 1;
    }
    result
}

/// Build canonical codes from depths
///
/// Codes are assigned in (depth, symbol) order and stored bit-reversed so
/// they can be written LSB-first.
pub fn convert_bit_depths_to_symbols(depth: &[u8], bits: &mut [u16]) {
    let mut bl_count = [0u16; MAX_HUFFMAN_BITS];
    for &d in depth {
        bl_count[d as usize] += 1;
    }
    bl_count[0] = 0;

    let mut next_code = [0u16; MAX_HUFFMAN_BITS];
    let mut code: u32 = 0;
    for i in 1..MAX_HUFFMAN_BITS {
        code = (code + bl_count[i - 1] as u32) << 1;
        next_code[i] = code as u16;
    }

    for (i, &d) in depth.iter().enumerate() {
        if d != 0 {
            bits[i] = reverse_bits(d, next_code[d as usize]);
            next_code[d as usize] = next_code[d as usize].wrapping_add(1);
        }
    }
}
