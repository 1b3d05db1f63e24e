// Include generated modules from build.rs (in OUT_DIR)
include!(concat!(env!("OUT_DIR"), "/mod.rs"));

pub fn fibo_orig(n: i32) -> i32 {
    if n < 2 {
        n
    } else {
        let mut a: i32 = 0;
        let mut b: i32 = 1;
        for _ in 2..=n {
            let tmp = a.wrapping_add(b);
            a = b;
            b = tmp;
        }
        b
    }
}

pub fn safe_div_orig(a: i32, b: i32) -> Option<i32> {
    a.checked_div(b)
}
