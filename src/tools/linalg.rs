//! Statistics and a dense linear solve used to fit predictor coefficients.
//! Kept deliberately small, the predictive codec treats this as a black box.

use crate::Error;

pub fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

pub fn variance(x: &[f64]) -> f64 {
    let m = mean(x);
    x.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / x.len() as f64
}

/// Pearson correlation coefficient of two equal-length sample planes
pub fn correlation(x: &[f64],y: &[f64]) -> f64 {
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..x.len() {
        cov += (x[i] - mx) * (y[i] - my);
        vx += (x[i] - mx) * (x[i] - mx);
        vy += (y[i] - my) * (y[i] - my);
    }
    if vx == 0.0 || vy == 0.0 {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
/// `a` is given in row-major order and is consumed.
pub fn solve(mut a: Vec<Vec<f64>>,mut b: Vec<f64>) -> Result<Vec<f64>,Error> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(Error::ConfigError("system is not square".to_string()));
    }
    for col in 0..n {
        let mut pivot = col;
        for row in col+1..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-12 {
            return Err(Error::ConfigError("singular correlation matrix".to_string()));
        }
        a.swap(col,pivot);
        b.swap(col,pivot);
        for row in col+1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0;n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row+1..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Ok(x)
}

// *************** TESTS *****************

#[test]
fn solves_small_system() {
    let a = vec![
        vec![2.0,1.0],
        vec![1.0,3.0]
    ];
    let b = vec![5.0,10.0];
    let x = solve(a,b).expect("singular");
    assert!((x[0] - 1.0).abs() < 1e-9);
    assert!((x[1] - 3.0).abs() < 1e-9);
}

#[test]
fn rejects_singular_system() {
    let a = vec![
        vec![1.0,2.0],
        vec![2.0,4.0]
    ];
    assert!(solve(a,vec![1.0,2.0]).is_err());
}

#[test]
fn correlation_of_identical_planes_is_one() {
    let x = vec![1.0,2.0,3.0,4.0];
    assert!((correlation(&x,&x) - 1.0).abs() < 1e-12);
}
