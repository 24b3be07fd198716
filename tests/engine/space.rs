use hypered::{Space, Variable};
use serde_json::json;

fn mixed_space() -> Space {
    Space::new(vec![
        Variable::real(-1.0, 1.0),
        Variable::categorical(["a", "b", "c"]),
        Variable::integer(2, 9),
        Variable::categorical(["x", "y"]),
        Variable::log_real(1e-3, 1.0),
    ])
    .unwrap()
}

#[test]
fn slots_partition_is_contiguous() {
    let space = mixed_space();
    assert_eq!(space.n_slots(), 3 + 3 + 2);

    let mut next = 0;
    for i in 0..space.len() {
        let slice = space.slice(i).unwrap();
        assert_eq!(slice.start, next, "gap before variable {i}");
        assert_eq!(slice.len(), space.variables()[i].size());
        next = slice.end;
    }
    assert_eq!(next, space.n_slots());
    assert!(space.slice(space.len()).is_none());
}

#[test]
fn samples_stay_in_the_unit_cube() {
    let space = mixed_space();
    let mut rng = fastrand::Rng::with_seed(17);
    assert!(space.sample(0, &mut rng).is_empty());
    for x in space.sample(500, &mut rng) {
        assert_eq!(x.len(), space.n_slots());
        assert!(x.iter().all(|v| (0.0..=1.0).contains(v)), "out of range: {x:?}");
        let values = space.denormalize(&x).unwrap();
        assert_eq!(values.len(), space.len());
    }
}

#[test]
fn bounds_map_to_low_and_high() {
    let space = Space::new(vec![Variable::real(-10.0, 10.0), Variable::integer(1, 8)]).unwrap();
    assert_eq!(space.denormalize(&[0.0, 0.0]).unwrap(), [json!(-10.0), json!(1)]);
    assert_eq!(space.denormalize(&[1.0, 1.0]).unwrap(), [json!(10.0), json!(8)]);
}

#[test]
fn one_hot_vectors_select_their_category() {
    let categories = ["relu", "tanh", "gelu", "silu"];
    let space = Space::new(vec![Variable::categorical(categories)]).unwrap();
    for (i, expected) in categories.iter().enumerate() {
        let mut x = vec![0.0; categories.len()];
        x[i] = 1.0;
        assert_eq!(space.denormalize(&x).unwrap(), [json!(expected)]);
    }
}
