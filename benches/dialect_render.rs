use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use db_switchboard::prelude::*;
use std::hint::black_box;

fn wide_template(columns: usize) -> SqlTemplate {
    let mut template = SqlTemplate::new("INSERT INTO ")
        .qualified(["app", "events"])
        .raw(" VALUES (");
    for i in 0..columns {
        if i > 0 {
            template = template.raw(", ");
        }
        template = template.param(match i % 4 {
            0 => RowValues::Int(i as i64),
            1 => RowValues::Text(format!("value-{i} with 'quotes'")),
            2 => RowValues::Bool(i % 3 == 0),
            _ => RowValues::Null,
        });
    }
    template.raw(")")
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    for columns in [4_usize, 32, 256] {
        let template = wide_template(columns);
        for dialect in [Dialect::Postgresql, Dialect::Mysql] {
            let formatter = formatter_for(dialect);
            group.bench_with_input(
                BenchmarkId::new(dialect.as_str(), columns),
                &template,
                |b, template| b.iter(|| formatter.render(black_box(template))),
            );
        }
    }
    group.finish();
}

fn bench_inline(c: &mut Criterion) {
    let mut group = c.benchmark_group("inline_params");
    for columns in [4_usize, 32, 256] {
        let rendered = formatter_for(Dialect::Mysql).render(&wide_template(columns));
        group.bench_with_input(
            BenchmarkId::from_parameter(columns),
            &rendered,
            |b, rendered| {
                b.iter(|| inline_params(black_box(&rendered.sql), &rendered.params, Dialect::Mysql))
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_render, bench_inline);
criterion_main!(benches);
