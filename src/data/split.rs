use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partitions `0..labels.len()` so that every class keeps (up to rounding)
/// the same share in train and test.
///
/// The test set holds `ceil(test_fraction * n)` rows. Each class contributes
/// `floor(n_test * class_count / n)` of them; the rows still missing go to the
/// classes with the largest fractional remainders, lower class first on ties.
/// The result depends only on `labels`, `test_fraction` and `seed`.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> SplitIndices {
    let n = labels.len();
    if n == 0 {
        return SplitIndices { train: vec![], test: vec![] };
    }
    let n_test = ((test_fraction * n as f64).ceil() as usize).min(n);

    let mut by_class: Vec<Vec<usize>> = Vec::new();
    for (idx, &label) in labels.iter().enumerate() {
        let class = label as usize;
        if by_class.len() <= class {
            by_class.resize_with(class + 1, Vec::new);
        }
        by_class[class].push(idx);
    }

    let allocation = allocate(&by_class.iter().map(Vec::len).collect::<Vec<_>>(), n_test);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (members, &k) in by_class.iter_mut().zip(&allocation) {
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    SplitIndices { train, test }
}

/// Largest-remainder apportionment of `total` test rows over class sizes.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let mut alloc: Vec<usize> = counts.iter().map(|&c| total * c / n).collect();

    let mut order: Vec<usize> = (0..counts.len()).filter(|&c| counts[c] > 0).collect();
    // Remainder of total * c / n, compared as exact integers.
    order.sort_by(|&a, &b| {
        let ra = total * counts[a] % n;
        let rb = total * counts[b] % n;
        rb.cmp(&ra).then(a.cmp(&b))
    });

    let mut missing = total - alloc.iter().sum::<usize>();
    while missing > 0 {
        let before = missing;
        for &class in &order {
            if missing == 0 {
                break;
            }
            if alloc[class] < counts[class] {
                alloc[class] += 1;
                missing -= 1;
            }
        }
        if missing == before {
            break;
        }
    }
    alloc
}
