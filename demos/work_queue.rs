//! A pool of worker threads draining a single job queue.

use std::thread;
use std::time::Duration;
use turbo_spmc::channel;

const WORKERS: usize = 4;
const JOBS: usize = 20;

fn main() {
    let (mut tx, rx) = channel(0, None).unwrap();

    let mut workers = vec![];
    for id in 0..WORKERS {
        let rx = rx.clone();
        workers.push(thread::spawn(move || {
            let mut processed = 0;
            loop {
                let job = rx.recv();
                if job == 0 {
                    break;
                }
                println!("worker {id} processing job {job}");
                thread::sleep(Duration::from_millis(20));
                processed += 1;
            }
            println!("worker {id} finished ({processed} jobs)");
        }));
    }
    drop(rx);

    for job in 1..=JOBS {
        println!("enqueued job {job}");
        tx.send(job).unwrap();
    }
    // One shutdown word per worker; each worker stops at its first one.
    for _ in 0..WORKERS {
        tx.send(0).unwrap();
    }

    for worker in workers {
        worker.join().unwrap();
    }
    println!("all jobs done");
}
