use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use mspair::data::identity::IdentityToSpectra;
use mspair::data::spectrum::BinnedSpectrum;
use mspair::{BatchSource, DataGenerator, DataGeneratorBuilder, GeneratorConfig, GeneratorError, SimilarityBand};

/// 100 identities with two replicate spectra each and a random symmetric score matrix.
fn synthetic_generator(config: GeneratorConfig, seed: u64) -> DataGenerator {
    let num_identities = 100;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut spectra = Vec::new();
    let mut spectrum_identities = Vec::new();
    for identity in 0..num_identities {
        for _ in 0..2 {
            let mut bins: Vec<u32> = (0..20).map(|_| rng.gen_range(0..config.dim as u32)).collect();
            bins.sort_unstable();
            bins.dedup();
            let intensity: Vec<f64> = bins.iter().map(|_| rng.gen::<f64>()).collect();
            spectra.push(BinnedSpectrum::new(bins, intensity).unwrap());
            spectrum_identities.push(identity);
        }
    }

    let mut scores = DMatrix::from_element(num_identities, num_identities, 1.0);
    for i in 0..num_identities {
        for j in (i + 1)..num_identities {
            // every tenth pair unknown
            let score = if (i + j) % 10 == 0 { f64::NAN } else { rng.gen::<f64>() };
            scores[(i, j)] = score;
            scores[(j, i)] = score;
        }
    }

    DataGeneratorBuilder::new()
        .spectra(spectra)
        .sample_ids((0..num_identities).collect())
        .scores(&scores)
        .identities(IdentityToSpectra::from_identity_indices(&spectrum_identities, num_identities).unwrap())
        .config(config)
        .build_seeded(seed)
        .unwrap()
}

fn small_dim_config() -> GeneratorConfig {
    GeneratorConfig { batch_size: 32, num_turns: 2, dim: 500, ..Default::default() }
}

#[test]
fn batch_count_uses_floor_times_turns() {
    let generator = synthetic_generator(small_dim_config(), 1);
    assert_eq!(generator.batch_count(), 6);
}

#[test]
fn every_batch_has_expected_shape_and_values() {
    let mut generator = synthetic_generator(small_dim_config(), 2);

    for index in 0..generator.batch_count() {
        let batch = generator.get_batch(index).unwrap();
        assert_eq!(batch.reference.shape(), &[32, 1, 500]);
        assert_eq!(batch.query.shape(), &[32, 1, 500]);
        assert_eq!(batch.labels.len(), 32);

        assert!(batch.reference.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(batch.query.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(batch.labels.iter().all(|&l| (0.0..=1.0).contains(&l)));

        for &(id1, id2) in &batch.pairs {
            assert_ne!(id1, id2);
        }
    }
}

#[test]
fn out_of_range_batch_index_fails() {
    let mut generator = synthetic_generator(small_dim_config(), 3);
    let count = generator.batch_count();

    assert!(matches!(
        generator.get_batch(count),
        Err(GeneratorError::IndexOutOfRange { .. })
    ));
}

#[test]
fn epoch_end_rebuilds_tiled_sequence() {
    let mut generator = synthetic_generator(small_dim_config(), 4);
    let first = generator.indexes().to_vec();
    generator.on_epoch_end();
    let second = generator.indexes().to_vec();

    assert_eq!(second.len(), 200);
    assert_ne!(first, second);

    let mut counts = vec![0usize; 100];
    for &position in &second {
        counts[position] += 1;
    }
    assert!(counts.iter().all(|&c| c == 2));
}

#[test]
fn unknown_scores_label_as_zero() {
    let mut generator = synthetic_generator(
        GeneratorConfig { same_prob_bins: vec![SimilarityBand::new(-0.1, 0.0)], ..small_dim_config() },
        5,
    );

    // only canonicalized unknown scores fall into (-0.1, 0]
    let batch = generator.get_batch(0).unwrap();
    for (i, &(id1, id2)) in batch.pairs.iter().enumerate() {
        if (id1 + id2) % 10 == 0 {
            assert_eq!(batch.labels[i], 0.0);
        }
    }
}

#[test]
fn fixed_random_source_is_reproducible() {
    let generator = synthetic_generator(small_dim_config(), 6);

    let first = generator.get_batch_with_rng(3, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
    let second = generator.get_batch_with_rng(3, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();

    assert_eq!(first.reference, second.reference);
    assert_eq!(first.query, second.query);
    assert_eq!(first.labels, second.labels);
}

#[test]
fn generator_is_usable_as_batch_source() {
    fn drain<S: BatchSource>(source: &mut S) -> usize {
        let mut produced = 0;
        for index in 0..source.batch_count() {
            if source.get_batch(index).is_ok() {
                produced += 1;
            }
        }
        source.on_epoch_end();
        produced
    }

    let mut generator = synthetic_generator(small_dim_config(), 8);
    assert_eq!(drain(&mut generator), 6);
    assert_eq!(drain(&mut generator), 6);
}

#[test]
fn feature_rows_encode_spectra_of_sampled_pair() {
    // identity i owns two single peak spectra at bins 2i and 2i + 1
    let num_identities = 20;
    let mut spectra = Vec::new();
    let mut spectrum_identities = Vec::new();
    for identity in 0..num_identities {
        for replicate in 0..2 {
            spectra.push(BinnedSpectrum::new(vec![(2 * identity + replicate) as u32], vec![1.0]).unwrap());
            spectrum_identities.push(identity);
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut scores = DMatrix::from_element(num_identities, num_identities, 1.0);
    for i in 0..num_identities {
        for j in (i + 1)..num_identities {
            let score = rng.gen::<f64>();
            scores[(i, j)] = score;
            scores[(j, i)] = score;
        }
    }

    let config = GeneratorConfig {
        batch_size: 5,
        dim: 2 * num_identities,
        peak_scaling: 1.0,
        augment_peak_removal: None,
        augment_intensity: 0.0,
        ..Default::default()
    };
    let mut generator = DataGeneratorBuilder::new()
        .spectra(spectra)
        .sample_ids((0..num_identities).collect())
        .scores(&scores)
        .identities(IdentityToSpectra::from_identity_indices(&spectrum_identities, num_identities).unwrap())
        .config(config)
        .build_seeded(12)
        .unwrap();

    let identity_of_row = |row: ndarray::ArrayView1<f32>| -> usize {
        let occupied: Vec<usize> = row.iter().enumerate().filter(|&(_, &v)| v != 0.0).map(|(bin, _)| bin).collect();
        assert_eq!(occupied.len(), 1);
        assert!((row[occupied[0]] - 1.0).abs() < 1e-6);
        occupied[0] / 2
    };

    for _ in 0..20 {
        for index in 0..generator.batch_count() {
            let batch = generator.get_batch(index).unwrap();
            for (i, &(id1, id2)) in batch.pairs.iter().enumerate() {
                assert_eq!(identity_of_row(batch.reference.slice(ndarray::s![i, 0, ..])), id1);
                assert_eq!(identity_of_row(batch.query.slice(ndarray::s![i, 0, ..])), id2);
                assert!((batch.labels[i] - scores[(id1, id2)] as f32).abs() < 1e-6);
            }
        }
        generator.on_epoch_end();
    }
}
