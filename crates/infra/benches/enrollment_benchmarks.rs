use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use classroll_auth::Principal;
use classroll_core::{CourseId, UserId};
use classroll_courses::{Capacity, CourseSnapshot, NewCourse, decide};
use classroll_infra::EnrollmentService;
use classroll_infra::store::{CourseStore, InMemoryCourseStore};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

async fn course_with_capacity(store: &InMemoryCourseStore, capacity: i64) -> CourseId {
    store
        .create_course(NewCourse {
            title: "Bench".to_string(),
            capacity: Capacity::new(capacity).unwrap(),
        })
        .await
        .unwrap()
        .id
}

/// Cost of the pure decision alone.
fn bench_decision(c: &mut Criterion) {
    let snapshot = CourseSnapshot::new(Capacity::new(30).unwrap(), 29);
    c.bench_function("decide_open_course", |b| {
        b.iter(|| decide(black_box(&snapshot), black_box(false)))
    });
}

/// Uncontended enrollments: one task, many courses.
fn bench_sequential_enrollment(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("sequential_enrollment");
    group.throughput(Throughput::Elements(1));

    group.bench_function("enroll_fresh_student", |b| {
        let store = Arc::new(InMemoryCourseStore::new());
        let course_id = rt.block_on(course_with_capacity(&store, i64::from(i32::MAX)));
        let service = EnrollmentService::new(store);

        b.iter(|| {
            rt.block_on(service.enroll(course_id, &Principal::student(UserId::new())))
                .unwrap()
        });
    });

    group.finish();
}

/// Many tasks racing for the same course lock.
fn bench_contended_enrollment(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended_enrollment");
    group.sample_size(20);

    for contenders in [8usize, 32, 128] {
        group.throughput(Throughput::Elements(contenders as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(contenders),
            &contenders,
            |b, &contenders| {
                b.iter(|| {
                    rt.block_on(async {
                        let store = Arc::new(InMemoryCourseStore::new());
                        let course_id = course_with_capacity(&store, (contenders / 2) as i64).await;
                        let service = Arc::new(EnrollmentService::new(store));

                        let handles: Vec<_> = (0..contenders)
                            .map(|_| {
                                let service = service.clone();
                                tokio::spawn(async move {
                                    service
                                        .enroll(course_id, &Principal::student(UserId::new()))
                                        .await
                                        .is_ok()
                                })
                            })
                            .collect();

                        let mut admitted = 0usize;
                        for handle in handles {
                            if handle.await.unwrap() {
                                admitted += 1;
                            }
                        }
                        assert_eq!(admitted, contenders / 2);
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decision,
    bench_sequential_enrollment,
    bench_contended_enrollment
);
criterion_main!(benches);
