use std::{io::Read, ptr};

use fitalloc::{FitAllocator, SearchMode};
use libc::sbrk;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how the program break moves.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

/// One process-wide allocator; quick-fit keeps allocations O(bucket scan).
static MALLOC: FitAllocator = FitAllocator::new(SearchMode::QuickFit);

fn main() {
  // RUST_LOG=debug surfaces the allocator's grow/refusal lines.
  env_logger::init();

  unsafe {
    // Initial heap state: nothing seeded yet.
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) First allocation. This lazily seeds the heap with one page and
    //    carves the block out of it.
    // --------------------------------------------------------------------
    let first = MALLOC.allocate(4);
    println!("\n[1] Allocate 4 bytes -> {:?}", first);
    (first as *mut u32).write(0xDEADBEEF);
    println!(
      "[1] Value written to first = 0x{:X}",
      (first as *mut u32).read()
    );
    print_program_break("after seed");
    println!("{}", MALLOC.stats());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) A few more blocks of mixed sizes, then a look at the layout.
    // --------------------------------------------------------------------
    let second = MALLOC.allocate(120);
    let third = MALLOC.allocate(500);
    println!("\n[2] Allocate 120 -> {:?}, 500 -> {:?}", second, third);
    ptr::write_bytes(second, 0xAB, 120);
    ptr::write_bytes(third, 0xCD, 500);

    println!("{}", MALLOC.stats());
    println!("{}", MALLOC.visualize());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Release the middle block: a hole opens up ('.' in the panel).
    // --------------------------------------------------------------------
    MALLOC.release(second);
    println!("\n[3] Released the 120-byte block at {:?}", second);
    println!("{}", MALLOC.visualize());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Allocate something that fits the hole and check whether the
    //    allocator reuses it.
    // --------------------------------------------------------------------
    let fourth = MALLOC.allocate(64);
    println!("\n[4] Allocate 64 bytes (check reuse of the hole)");
    println!(
      "[4] fourth == second? {}",
      if fourth == second {
        "Yes, it reused the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate a large block to force heap growth, then watch the
    //    break move.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big = MALLOC.allocate(64 * 1024);
    println!("\n[5] Allocate large 64 KiB block -> {:?}", big);

    print_program_break("after large alloc");
    println!("{}", MALLOC.stats());
    println!("{}", MALLOC.visualize());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Release everything. The break never moves back down; the freed
    //    bytes coalesce and wait for the next allocation.
    // --------------------------------------------------------------------
    MALLOC.release(first);
    MALLOC.release(third);
    MALLOC.release(fourth);
    MALLOC.release(big);

    println!("\n[6] Released everything.");
    println!("{}", MALLOC.stats());
    println!("{}", MALLOC.visualize());
    print_program_break("end");
  }
}
