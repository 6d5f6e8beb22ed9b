use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nbeats_core::data::source::Series;
use nbeats_core::data::{SeriesTable, StaticTable, create_loaders};
use nbeats_core::data::loader::LoaderParams;
use nbeats_core::forecast::{ForecastFrame, ForecastRow, aggregate_median};
use nbeats_core::training::{EnsembleGridSpec, NbeatsHyperparameters};
use std::sync::Arc;

fn bench_grid_expansion(c: &mut Criterion) {
    let spec = EnsembleGridSpec {
        random_seed: (1..=10).collect(),
        ..Default::default()
    };
    let hp = NbeatsHyperparameters::new("Monthly", &spec).unwrap();

    c.bench_function("outer_grid_expand", |b| b.iter(|| black_box(&hp.grid).expand()));

    c.bench_function("ensemble_grid_expand", |b| {
        b.iter(|| black_box(&hp.ensemble_grid).expand())
    });

    c.bench_function("build_monthly_hyperparameters", |b| {
        b.iter(|| NbeatsHyperparameters::new(black_box("Monthly"), &spec))
    });
}

fn bench_loaders(c: &mut Criterion) {
    let series = Arc::new(SeriesTable {
        series: (0..500)
            .map(|i| Series {
                unique_id: format!("M{i}"),
                ds: (0..200).map(|t| t.to_string()).collect(),
                y: (0..200).map(|t| (i + t) as f64).collect(),
            })
            .collect(),
    });
    let statics = Arc::new(StaticTable::default());
    let params = LoaderParams {
        n_time_in: 36,
        n_time_out: 18,
        batch_size: 1024,
        train_sample_freq: 1,
    };

    c.bench_function("create_loaders_500_series", |b| {
        b.iter(|| create_loaders(black_box(&series), &statics, &params, 0))
    });

    let loaders = create_loaders(&series, &statics, &params, 0).unwrap();
    c.bench_function("train_loader_epoch_batches", |b| {
        b.iter(|| {
            loaders
                .train
                .batches(black_box(3))
                .map(|batch| batch.len())
                .sum::<usize>()
        })
    });
}

fn bench_aggregation(c: &mut Criterion) {
    let frames: Vec<ForecastFrame> = (0..54)
        .map(|m| ForecastFrame {
            rows: (0..1000)
                .map(|id| ForecastRow {
                    unique_id: id,
                    model: format!("m_{}", m + 1),
                    values: (0..18).map(|h| (id * m + h) as f64).collect(),
                })
                .collect(),
        })
        .collect();

    c.bench_function("aggregate_median_54_members", |b| {
        b.iter(|| aggregate_median(black_box(&frames)))
    });
}

criterion_group!(benches, bench_grid_expansion, bench_loaders, bench_aggregation);
criterion_main!(benches);
