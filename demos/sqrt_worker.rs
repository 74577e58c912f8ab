//! One worker thread computing square roots for the main thread.
//!
//! Payloads are `f64` bit-patterns carried in the queue's machine words;
//! an all-zero word doubles as the shutdown signal.

use std::thread;
use turbo_spmc::channel;

fn main() {
    let (mut tx, rx) = channel(0, None).unwrap();

    let worker = thread::spawn(move || {
        loop {
            let word = rx.recv();
            if word == 0 {
                break;
            }
            let x = f64::from_bits(word as u64);
            println!("the square root of {x} is {}", x.sqrt());
        }
        println!("done");
    });

    for i in 1..127 {
        let x = i as f64;
        tx.send(x.to_bits() as usize).unwrap();
    }
    tx.send(0).unwrap();

    println!("waiting...");
    worker.join().unwrap();
}
