use holdout_types::TaskInstance;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const GEOMETRY_SOURCE: &str = "\
def compute_area(width, height):
    result = width * height
    return result


def describe(width, height):
    area = compute_area(width, height)
    if True:
        label = 'area'
    return label + '=' + str(area)


class Rectangle:
    def __init__(self, width, height):
        self.width = width
        self.height = height
";

pub const FOO_SOURCE: &str = "\
def scale(values, factor):
    scaled = []
    for i in range(len(values)):
        scaled.append(values[i] * factor)
    return scaled


LIMIT = 2 + 3
";

pub const TEST_FOO_SOURCE: &str = "\
from foo import scale


def test_scale():
    expected = [2, 4]
    assert scale([1, 2], 2) == expected
";

pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

/// `<tmp>/widgets` with two modules and two test files. The repository sits
/// one level down so retro-holdout copies land inside the temp dir.
pub fn sample_repo(dir: &TempDir) -> PathBuf {
    let root = dir.path().join("widgets");
    write_file(&root, "geometry.py", GEOMETRY_SOURCE);
    write_file(&root, "foo.py", FOO_SOURCE);
    write_file(&root, "test_foo.py", TEST_FOO_SOURCE);
    write_file(
        &root,
        "tests/test_geometry.py",
        "from geometry import compute_area\n\n\ndef test_area():\n    assert compute_area(2, 3) == 6\n",
    );
    root
}

pub fn sample_instance(id: &str) -> TaskInstance {
    let mut instance = TaskInstance::new(
        id,
        "acme/widgets",
        "0123abcd",
        "compute_area returns the wrong result for negative width. The describe helper should fix this.",
        "--- a/geometry.py\n+++ b/geometry.py\n@@ -1,3 +1,5 @@\n def compute_area(width, height):\n+    if width < 0:\n+        raise ValueError(width)\n     result = width * height\n",
    );
    instance.fail_to_pass = vec!["tests/test_geometry.py::test_area".to_string()];
    instance.test_commands = vec!["python -m pytest -q".to_string()];
    instance
}
