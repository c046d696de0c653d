mod common;

use digit_mlops::data::{run_preparation, PreparedDataset};
use digit_mlops::Error;

#[test]
fn prepares_stratified_normalized_arrays() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    common::write_digit_csv(input.path(), 10);

    let report = run_preparation(input.path(), &output.path().join("prepared")).unwrap();
    assert_eq!(report.total_samples, 100);
    assert_eq!(report.train_samples, 80);
    assert_eq!(report.test_samples, 20);
    assert_eq!(report.num_classes, 10);

    let prepared = PreparedDataset::load(&output.path().join("prepared")).unwrap();
    assert_eq!(prepared.train.len() + prepared.test.len(), 100);
    assert_eq!(prepared.train.images.len(), 80 * 784);
    assert!(prepared.train.images.iter().chain(&prepared.test.images).all(|v| (0.0..=1.0).contains(v)));

    for digit in 0..10u8 {
        assert_eq!(prepared.test.labels.iter().filter(|&&l| l == digit).count(), 2);
        assert_eq!(prepared.train.labels.iter().filter(|&&l| l == digit).count(), 8);
    }
}

#[test]
fn images_stay_aligned_with_labels() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    common::write_digit_csv(input.path(), 5);
    run_preparation(input.path(), output.path()).unwrap();

    let prepared = PreparedDataset::load(output.path()).unwrap();
    for set in [&prepared.train, &prepared.test] {
        for i in 0..set.len() {
            let band_row = 2 * set.labels[i] as usize + 5;
            assert!(set.image(i)[band_row * 28 + 10] > 0.75, "sample {} lost its label", i);
        }
    }
}

#[test]
fn output_is_deterministic() {
    let input = tempfile::tempdir().unwrap();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    common::write_digit_csv(input.path(), 7);

    run_preparation(input.path(), first.path()).unwrap();
    run_preparation(input.path(), second.path()).unwrap();
    for file in ["x_train.npy", "y_train.npy", "x_test.npy", "y_test.npy"] {
        let a = std::fs::read(first.path().join(file)).unwrap();
        let b = std::fs::read(second.path().join(file)).unwrap();
        assert_eq!(a, b, "{} differs between runs", file);
    }
}

#[test]
fn rejects_bad_rows() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut row = vec!["11".to_string()];
    row.extend(std::iter::repeat("0".to_string()).take(784));
    std::fs::write(input.path().join("mnist_full.csv"), row.join(",")).unwrap();

    let err = run_preparation(input.path(), output.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
    assert!(!output.path().join("x_train.npy").exists());
}
