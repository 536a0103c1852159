//! Pre-built mock host scenarios for testing.
//!
//! These scenarios provide realistic `/proc` contents together with a
//! populated directory tree and residency table.

use super::filesystem::MockFs;
use crate::mem::DeviceId;

/// Root filesystem device in the scenarios.
pub const ROOT_DEV: DeviceId = DeviceId::new(8, 1);
/// Device of the `/home` filesystem in [`MockFs::typical_host`].
pub const HOME_DEV: DeviceId = DeviceId::new(8, 2);

const FILESYSTEMS: &str = "\
nodev\tsysfs
nodev\ttmpfs
nodev\tproc
\text4
\txfs
\tvfat
";

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

impl MockFs {
    /// Creates a typical host: ext4 root, xfs `/home`, procfs and tmpfs.
    ///
    /// Root filesystem contents (4 KiB pages):
    ///
    /// | path | size | resident pages |
    /// |------|------|----------------|
    /// | `/etc/passwd` | 4 KiB | 1 |
    /// | `/usr/lib/libc.so.6` | 2 MiB | 512 |
    /// | `/var/log/syslog` (+ hard link `syslog.link`) | 1 MiB | 128 |
    /// | `/var/cache/cold.bin` | 4 MiB | 0 |
    /// | `/var/lib/empty.db` | 0 | 0 |
    /// | `/srv/www/index.html` | 8 KiB | 1 |
    ///
    /// `/home/user/notes.txt` (8 KiB, 2 pages) lives on the xfs device. A bind
    /// mount of `/srv` repeats the root device.
    pub fn typical_host() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/filesystems", FILESYSTEMS);
        fs.add_file(
            "/proc/self/mountinfo",
            "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw,errors=remount-ro
23 22 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
24 22 0:24 / /run rw,nosuid,nodev shared:5 - tmpfs tmpfs rw,mode=755
25 22 8:2 / /home rw,relatime shared:30 - xfs /dev/sda2 rw,attr2,inode64
26 22 8:1 /srv /mnt/srv rw,relatime shared:1 - ext4 /dev/sda1 rw,errors=remount-ro
",
        );

        fs.mount_dir("/", ROOT_DEV);
        fs.mount_dir("/proc", DeviceId::new(0, 21));
        fs.mount_dir("/run", DeviceId::new(0, 24));
        fs.mount_dir("/home", HOME_DEV);

        fs.add_cached_file("/etc/passwd", ROOT_DEV, 4 * KIB, 1);
        fs.add_cached_file("/usr/lib/libc.so.6", ROOT_DEV, 2 * MIB, 512);
        fs.add_cached_file("/var/log/syslog", ROOT_DEV, MIB, 128);
        fs.add_hard_link("/var/log/syslog", "/var/log/syslog.link");
        fs.add_cached_file("/var/cache/cold.bin", ROOT_DEV, 4 * MIB, 0);
        fs.add_cached_file("/var/lib/empty.db", ROOT_DEV, 0, 0);
        fs.add_cached_file("/srv/www/index.html", ROOT_DEV, 8 * KIB, 1);

        fs.add_cached_file("/home/user/notes.txt", HOME_DEV, 8 * KIB, 2);
        fs
    }

    /// Creates a host whose only block-backed mount is xfs, so nothing is
    /// allow-listed even though ext4 is registered.
    pub fn no_ext4_host() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/filesystems", FILESYSTEMS);
        fs.add_file(
            "/proc/self/mountinfo",
            "\
22 1 8:2 / / rw,relatime shared:1 - xfs /dev/sda2 rw
23 22 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
",
        );
        fs.mount_dir("/", HOME_DEV);
        fs.mount_dir("/proc", DeviceId::new(0, 21));
        fs.add_cached_file("/data/blob", HOME_DEV, 16 * KIB, 4);
        fs
    }

    /// Creates a container-style host whose `mountinfo` lists bind mounts of
    /// the root device (a single file and a subtree) before the root itself.
    ///
    /// Resident on the root device: `/etc/hosts` (1 page),
    /// `/usr/lib/libc.so.6` (2 pages) and `/srv/www/index.html` (1 page).
    pub fn container_host() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/filesystems", FILESYSTEMS);
        fs.add_file(
            "/proc/self/mountinfo",
            "\
30 1 8:1 /var/lib/containers/hosts /etc/hosts rw,relatime - ext4 /dev/sda1 rw
31 1 8:1 /srv /mnt/srv rw,relatime - ext4 /dev/sda1 rw
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
23 22 0:21 / /proc rw,nosuid,nodev,noexec,relatime - proc proc rw
",
        );
        fs.mount_dir("/", ROOT_DEV);
        fs.mount_dir("/proc", DeviceId::new(0, 21));
        fs.add_cached_file("/etc/hosts", ROOT_DEV, 4 * KIB, 1);
        fs.add_cached_file("/usr/lib/libc.so.6", ROOT_DEV, 2 * MIB, 2);
        fs.add_cached_file("/srv/www/index.html", ROOT_DEV, 8 * KIB, 1);
        fs
    }

    /// Creates an ext4 root holding `count` one-page files, all resident.
    pub fn many_files(count: usize) -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/filesystems", FILESYSTEMS);
        fs.add_file(
            "/proc/self/mountinfo",
            "22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw\n",
        );
        fs.mount_dir("/", ROOT_DEV);
        fs.mount_dir("/proc", DeviceId::new(0, 21));
        for i in 0..count {
            fs.add_cached_file(format!("/data/file{:05}", i), ROOT_DEV, 4 * KIB, 1);
        }
        fs
    }
}
