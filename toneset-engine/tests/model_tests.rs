//! Integration tests for the audibility models

use toneset_engine::error::Error;
use toneset_engine::model::RampCurve;
use toneset_engine::results::{CalibrationResults, FloorResults, RampResults};
use toneset_engine::{piecewise_linear, AudibilityModel, Predictor, RampModel, Tone};

/// 250 Hz heard from 40 up, 1000 Hz from 20 up, 4000 Hz partially everywhere
fn calibration() -> CalibrationResults {
    let mut results = CalibrationResults::new();
    for &(frequency, volume, heard, missed) in &[
        (250.0, 20.0, 0, 4),
        (250.0, 40.0, 4, 0),
        (250.0, 60.0, 4, 0),
        (1000.0, 10.0, 0, 4),
        (1000.0, 20.0, 2, 2),
        (1000.0, 30.0, 4, 0),
        (4000.0, 50.0, 1, 3),
        (4000.0, 80.0, 3, 1),
    ] {
        for _ in 0..heard {
            results.record(frequency, volume, true);
        }
        for _ in 0..missed {
            results.record(frequency, volume, false);
        }
    }
    results
}

#[test]
fn test_probability_is_bounded_everywhere() {
    let results = calibration();
    let model = AudibilityModel::new(&results);

    let frequencies = [20.0, 100.0, 250.0, 400.0, 1000.0, 2500.0, 4000.0, 12000.0];
    let volumes = [0.0, 1.0, 15.0, 20.0, 35.0, 55.0, 100.0, 32767.0];
    for &frequency in &frequencies {
        for &volume in &volumes {
            let p = model.probability_at(frequency, volume).unwrap();
            assert!((0.0..=1.0).contains(&p), "p({}, {}) = {}", frequency, volume, p);
        }
    }
}

#[test]
fn test_interpolates_between_tested_frequencies() {
    let results = calibration();
    let model = AudibilityModel::new(&results);

    // Exact tested points
    assert_eq!(model.probability_at(1000.0, 20.0).unwrap(), 0.5);
    assert_eq!(model.probability_at(250.0, 40.0).unwrap(), 1.0);

    // Halfway in frequency between 250 Hz (1.0 at 40) and 1000 Hz (1.0 at 40)
    assert_eq!(model.probability_at(625.0, 40.0).unwrap(), 1.0);

    // Halfway between 250 Hz (0.0 at 20) and 1000 Hz (0.5 at 20)
    assert!((model.probability_at(625.0, 20.0).unwrap() - 0.25).abs() < 1e-12);

    // Beyond the tested range the nearest frequency is used
    assert_eq!(
        model.probability_at(8000.0, 80.0).unwrap(),
        model.probability_at(4000.0, 80.0).unwrap()
    );
}

#[test]
fn test_floor_and_ceiling_estimates() {
    let results = calibration();
    let model = AudibilityModel::new(&results);

    assert_eq!(model.floor_at(250.0).unwrap(), 20.0);
    assert_eq!(model.ceiling_at(250.0).unwrap(), 40.0);
    assert_eq!(model.floor_at(1000.0).unwrap(), 10.0);
    assert_eq!(model.ceiling_at(1000.0).unwrap(), 30.0);
    // Never fully heard nor fully missed: quietest and loudest tested volumes
    assert_eq!(model.floor_at(4000.0).unwrap(), 50.0);
    assert_eq!(model.ceiling_at(4000.0).unwrap(), 80.0);
}

#[test]
fn test_multi_note_tones_average_their_notes() {
    let results = calibration();
    let model = AudibilityModel::new(&results);

    let tone = Tone::interval(250.0, 1000.0, 20.0).unwrap();
    let expected = (model.probability_at(250.0, 20.0).unwrap() + model.probability_at(1000.0, 20.0).unwrap()) / 2.0;
    assert!((model.probability(&tone).unwrap() - expected).abs() < 1e-12);

    let ceiling = model.ceiling_estimate(&tone).unwrap();
    assert!((ceiling - 35.0).abs() < 1e-12);
}

#[test]
fn test_empty_models_are_not_initialized() {
    let empty = CalibrationResults::new();
    let model = AudibilityModel::new(&empty);
    assert!(matches!(
        model.probability_at(1000.0, 10.0),
        Err(Error::ModelNotInitialized(_))
    ));

    let ramp = RampResults::new();
    let ramp_model = RampModel::new(&ramp, None, RampCurve::Linear);
    assert!(matches!(
        ramp_model.ceiling_at(1000.0),
        Err(Error::ModelNotInitialized(_))
    ));
}

#[test]
fn test_ramp_model_curves_stay_bounded() {
    let mut ramp = RampResults::new();
    ramp.record(500.0, 80.0, 60.0);
    ramp.record(2000.0, 40.0, 50.0);
    let mut floors = FloorResults::new();
    floors.record(500.0, 20.0);

    for curve in [RampCurve::Linear, RampCurve::Logarithmic] {
        let model = RampModel::new(&ramp, Some(&floors), curve);
        assert_eq!(model.ceiling_at(500.0).unwrap(), 60.0);
        assert_eq!(model.floor_at(500.0).unwrap(), 20.0);
        // No floor recorded at 2000 Hz: half the ceiling
        assert_eq!(model.floor_at(2000.0).unwrap(), 20.0);

        assert_eq!(model.probability_at(500.0, 10.0).unwrap(), 0.0);
        assert!((model.probability_at(500.0, 60.0).unwrap() - 1.0).abs() < 1e-12);
        for volume in [0.0, 25.0, 40.0, 55.0, 1000.0] {
            let p = model.probability_at(1000.0, volume).unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    let linear = RampModel::new(&ramp, Some(&floors), RampCurve::Linear);
    let log = RampModel::new(&ramp, Some(&floors), RampCurve::Logarithmic);
    // ln((e - 1)x + 1) lies above x on (0, 1)
    assert!(log.probability_at(500.0, 40.0).unwrap() > linear.probability_at(500.0, 40.0).unwrap());
}

#[test]
fn test_piecewise_linear_clamps_to_end_points() {
    let points = [(1.0, 10.0), (3.0, 30.0)];
    assert_eq!(piecewise_linear(&points, 0.0), Some(10.0));
    assert_eq!(piecewise_linear(&points, 2.0), Some(20.0));
    assert_eq!(piecewise_linear(&points, 9.0), Some(30.0));
    assert_eq!(piecewise_linear(&[], 1.0), None);
}
