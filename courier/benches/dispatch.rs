use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use courier::{bootstrap, compile_source, Interpreter};

const FIB: &str = "let fib := [\n\
                     on {fib: 0} 0;\n\
                     on {fib: 1} 1;\n\
                     on {fib: n} self{fib: n - 1} + self{fib: n - 2}\n\
                   ];\n";

fn bench_guarded_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_dispatch");
    for n in [10, 15, 20] {
        let vm = Rc::new(bootstrap());
        let program = compile_source(&vm, &format!("{FIB}fib{{fib: {n}}}")).unwrap();
        group.bench_with_input(BenchmarkId::new("fib", n), &program, |b, program| {
            b.iter(|| {
                let mut interp = Interpreter::new(vm.clone());
                black_box(interp.run(program).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");
    let vm = Rc::new(bootstrap());
    let program = compile_source(
        &vm,
        "var p := [x: 0 y: 0];\n\
         let step := [on {move: var q} (let cur := q; q := cur{x: cur{x} + 1}{y: cur{y} + 2}; 0)];\n\
         step{move: var p}; step{move: var p}; step{move: var p};\n\
         let end := p;\n\
         end{x} + end{y}",
    )
    .unwrap();
    group.bench_function("update_var_frame", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new(vm.clone());
            black_box(interp.run(&program).unwrap())
        });
    });

    group.bench_function("compile_frame_literal", |b| {
        b.iter(|| black_box(compile_source(&vm, "[a: 1 b: 2 c: 3]{b}").unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_guarded_dispatch, bench_frames);
criterion_main!(benches);
