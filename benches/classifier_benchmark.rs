use criterion::{black_box, criterion_group, criterion_main, Criterion};
use categorist::{Classifier, Tokenizer};

fn setup_benchmark_classifier(classes: usize, examples_per_class: usize) -> Classifier {
    let classifier = Classifier::builder().build().unwrap();
    for c in 0..classes {
        for e in 0..examples_per_class {
            classifier
                .train(
                    &format!("merchant{} store{} card payment ref{}", c, e % 7, e),
                    &format!("class_{}", c),
                )
                .unwrap();
        }
    }
    classifier
}

fn bench_tokenization(c: &mut Criterion) {
    let tokenizer = Tokenizer::default();
    let mut group = c.benchmark_group("Tokenization");

    // Configure sampling
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    group.bench_function("short_description", |b| b.iter(|| {
        tokenizer.tokenize(black_box("TESCO STORES 3297"))
    }));

    group.bench_function("long_description", |b| b.iter(|| {
        tokenizer.tokenize(black_box(
            "CARD PAYMENT TO AMAZON.CO.UK*MK2LL8QQ4 ON 12-03-2024 REF 000123456789, \
             AMZN.CO.UK/BILL LU GBP 23.99 VIA APPLE PAY"
        ))
    }));

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Prediction");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let classifier = setup_benchmark_classifier(20, 50);
    group.bench_function("classify_known_tokens", |b| b.iter(|| {
        classifier.classify(black_box("merchant7 store3 card payment"))
    }));
    group.bench_function("classify_unseen_tokens", |b| b.iter(|| {
        classifier.classify(black_box("completely novel description here"))
    }));

    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("Training");
    group.sample_size(50);

    let classifier = setup_benchmark_classifier(20, 10);
    group.bench_function("train_single_example", |b| b.iter(|| {
        classifier.train(black_box("merchant3 store1 card payment"), black_box("class_3")).unwrap()
    }));

    group.finish();
}

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scaling");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    // Test scaling with number of classes
    let class_counts = [2, 10, 50, 200];
    for &count in &class_counts {
        let classifier = setup_benchmark_classifier(count, 20);
        group.bench_function(format!("classes_{}", count), |b| b.iter(|| {
            classifier.classify(black_box("merchant1 store2 card payment"))
        }));
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tokenization,
    bench_prediction,
    bench_training,
    bench_scaling
);
criterion_main!(benches);
